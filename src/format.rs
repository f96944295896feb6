//! Human-readable distance and duration strings.

/// `"850 m"` below a kilometer, `"1.25 km"` from there on.
///
/// NaN and infinite values are shown as `"unknown"`.
pub fn format_distance(meters: f64) -> String {
    if !meters.is_finite() {
        return "unknown".to_string();
    }
    if meters < 1000.0 {
        return format!("{} m", meters.round() as i64);
    }
    format!("{:.2} km", meters / 1000.0)
}

/// `"1h 5m"`, `"3m 20s"` or `"45s"`.
///
/// A negative duration comes from a bad clock or a misrecorded start time and
/// is shown as `"unknown"`.
pub fn format_duration(millis: i64) -> String {
    if millis < 0 {
        return "unknown".to_string();
    }
    let seconds = millis / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
