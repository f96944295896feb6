//! # Reminder Store
//!
//! Location reminders that fire when the user comes within a trigger radius.
//! Same durability model as [`crate::RouteStore`] (write-through JSON blob,
//! corrupt blob loads as empty), but kept in insertion order.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo_utils::haversine_lat_lng;
use crate::{Clock, KeyValueStore, Result, TrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderCategory {
    Visit,
    Avoid,
    Note,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: ReminderLocation,
    pub created_at: i64,
    /// Meters
    pub trigger_radius: f64,
    pub is_completed: bool,
    pub category: ReminderCategory,
}

impl Reminder {
    /// Distance from a point to the reminder's location, in meters.
    pub fn distance_from(&self, lat: f64, lng: f64) -> f64 {
        haversine_lat_lng(lat, lng, self.location.lat, self.location.lng)
    }
}

/// Fields supplied by the user when creating a reminder.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub title: String,
    pub description: Option<String>,
    pub location: ReminderLocation,
    pub trigger_radius: f64,
    pub category: ReminderCategory,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReminderUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<ReminderLocation>,
    pub trigger_radius: Option<f64>,
    pub is_completed: Option<bool>,
    pub category: Option<ReminderCategory>,
}

impl ReminderUpdate {
    fn apply(self, reminder: &mut Reminder) {
        if let Some(title) = self.title {
            reminder.title = title;
        }
        if let Some(description) = self.description {
            reminder.description = description;
        }
        if let Some(location) = self.location {
            reminder.location = location;
        }
        if let Some(radius) = self.trigger_radius {
            reminder.trigger_radius = radius;
        }
        if let Some(done) = self.is_completed {
            reminder.is_completed = done;
        }
        if let Some(category) = self.category {
            reminder.category = category;
        }
    }
}

pub struct ReminderStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    clock: Arc<dyn Clock>,
    reminders: Vec<Reminder>,
}

impl ReminderStore {
    /// Load the collection stored under `key`.
    pub fn open(storage: Arc<dyn KeyValueStore>, key: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let reminders = match storage.get(key)? {
            Some(blob) => serde_json::from_str::<Vec<Reminder>>(&blob).unwrap_or_else(|e| {
                warn!(
                    "[ReminderStore] {}; starting empty",
                    TrackerError::StorageCorrupt {
                        key: key.to_string(),
                        message: e.to_string(),
                    }
                );
                Vec::new()
            }),
            None => Vec::new(),
        };
        info!("[ReminderStore] Loaded {} reminders", reminders.len());

        Ok(Self {
            storage,
            key: key.to_string(),
            clock,
            reminders,
        })
    }

    /// Create a reminder (not completed, stamped now) at the end of the list.
    pub fn add(&mut self, new: NewReminder) -> Result<Reminder> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(TrackerError::EmptyName);
        }

        let reminder = Reminder {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: new.description.filter(|d| !d.trim().is_empty()),
            location: new.location,
            created_at: self.clock.now_millis(),
            trigger_radius: new.trigger_radius,
            is_completed: false,
            category: new.category,
        };

        let mut updated = self.reminders.clone();
        updated.push(reminder.clone());
        self.commit(updated)?;
        info!("[ReminderStore] Added '{}'", reminder.title);
        Ok(reminder)
    }

    /// Apply a partial update. Unknown ids are a no-op returning `None`.
    pub fn update(&mut self, id: &str, changes: ReminderUpdate) -> Result<Option<Reminder>> {
        let Some(index) = self.reminders.iter().position(|r| r.id == id) else {
            debug!("[ReminderStore] Update of unknown reminder {}", id);
            return Ok(None);
        };
        let mut updated = self.reminders.clone();
        changes.apply(&mut updated[index]);
        let reminder = updated[index].clone();
        self.commit(updated)?;
        Ok(Some(reminder))
    }

    /// Flip the completed flag. Unknown ids are a no-op.
    pub fn toggle_complete(&mut self, id: &str) -> Result<Option<Reminder>> {
        let Some(done) = self.get(id).map(|r| r.is_completed) else {
            return Ok(None);
        };
        self.update(
            id,
            ReminderUpdate {
                is_completed: Some(!done),
                ..Default::default()
            },
        )
    }

    /// Remove a reminder. Unknown ids are a no-op.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Ok(());
        }
        let updated: Vec<Reminder> = self.reminders.iter().filter(|r| r.id != id).cloned().collect();
        self.commit(updated)?;
        info!("[ReminderStore] Deleted {}", id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Reminder> {
        self.reminders.iter().find(|r| r.id == id)
    }

    /// All reminders in creation order.
    pub fn list(&self) -> &[Reminder] {
        &self.reminders
    }

    pub fn active(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders.iter().filter(|r| !r.is_completed)
    }

    pub fn completed(&self) -> impl Iterator<Item = &Reminder> {
        self.reminders.iter().filter(|r| r.is_completed)
    }

    /// Open reminders whose trigger radius contains the point.
    pub fn nearby(&self, lat: f64, lng: f64) -> Vec<&Reminder> {
        self.active()
            .filter(|r| r.distance_from(lat, lng) <= r.trigger_radius)
            .collect()
    }

    fn commit(&mut self, updated: Vec<Reminder>) -> Result<()> {
        let blob = serde_json::to_string(&updated)?;
        self.storage.set(&self.key, &blob)?;
        self.reminders = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FailingStorage;
    use crate::{ManualClock, MemoryStorage};

    fn open(storage: &MemoryStorage) -> ReminderStore {
        ReminderStore::open(
            Arc::new(storage.clone()),
            "reminders",
            Arc::new(ManualClock::new(1_000)),
        )
        .unwrap()
    }

    fn new_reminder(title: &str, lat: f64, lng: f64, radius: f64) -> NewReminder {
        NewReminder {
            title: title.to_string(),
            description: None,
            location: ReminderLocation {
                lat,
                lng,
                name: Some(title.to_string()),
            },
            trigger_radius: radius,
            category: ReminderCategory::Visit,
        }
    }

    #[test]
    fn test_add_and_reload() {
        let storage = MemoryStorage::new();
        let added = {
            let mut store = open(&storage);
            store.add(new_reminder("Groceries", 51.5, -0.12, 100.0)).unwrap()
        };
        assert!(!added.is_completed);
        assert_eq!(added.created_at, 1_000);

        let store = open(&storage);
        assert_eq!(store.list(), &[added]);
    }

    #[test]
    fn test_blank_title_rejected() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        assert!(matches!(
            store.add(new_reminder("  ", 0.0, 0.0, 10.0)),
            Err(TrackerError::EmptyName)
        ));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_insertion_order() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        store.add(new_reminder("First", 0.0, 0.0, 10.0)).unwrap();
        store.add(new_reminder("Second", 0.0, 0.0, 10.0)).unwrap();
        let titles: Vec<&str> = store.list().iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn test_toggle_and_filters() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let r = store.add(new_reminder("Bakery", 0.0, 0.0, 10.0)).unwrap();
        store.add(new_reminder("Park", 0.0, 0.0, 10.0)).unwrap();

        let toggled = store.toggle_complete(&r.id).unwrap().unwrap();
        assert!(toggled.is_completed);
        assert_eq!(store.active().count(), 1);
        assert_eq!(store.completed().count(), 1);

        store.toggle_complete(&r.id).unwrap();
        assert_eq!(store.completed().count(), 0);
        assert!(store.toggle_complete("missing").unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        let r = store.add(new_reminder("Old title", 0.0, 0.0, 10.0)).unwrap();

        let updated = store
            .update(
                &r.id,
                ReminderUpdate {
                    title: Some("New title".to_string()),
                    category: Some(ReminderCategory::Avoid),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "New title");
        assert_eq!(updated.category, ReminderCategory::Avoid);
        assert_eq!(updated.trigger_radius, 10.0);

        store.delete("missing").unwrap();
        assert_eq!(store.list().len(), 1);
        store.delete(&r.id).unwrap();
        assert!(open(&storage).list().is_empty());
    }

    #[test]
    fn test_nearby() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        // ~111 m north of the origin
        let close = store.add(new_reminder("Close", 0.001, 0.0, 150.0)).unwrap();
        store.add(new_reminder("Tight", 0.001, 0.0, 50.0)).unwrap();
        let done = store.add(new_reminder("Done", 0.0, 0.0, 500.0)).unwrap();
        store.toggle_complete(&done.id).unwrap();

        let nearby = store.nearby(0.0, 0.0);
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].id, close.id);
    }

    #[test]
    fn test_wire_format() {
        let storage = MemoryStorage::new();
        let mut store = open(&storage);
        store.add(new_reminder("Cafe", 1.0, 2.0, 100.0)).unwrap();

        let blob = storage.get("reminders").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&blob).unwrap();
        let r = &json[0];
        assert_eq!(r["title"], "Cafe");
        assert_eq!(r["category"], "visit");
        assert_eq!(r["triggerRadius"], 100.0);
        assert_eq!(r["isCompleted"], false);
        assert_eq!(r["createdAt"], 1000);
        assert_eq!(r["location"]["name"], "Cafe");
        assert!(r.get("description").is_none());
    }

    #[test]
    fn test_failed_write_leaves_list_unchanged() {
        let storage = FailingStorage::new();
        let mut store = ReminderStore::open(
            Arc::new(storage.clone()),
            "reminders",
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        let kept = store.add(new_reminder("Kept", 0.0, 0.0, 10.0)).unwrap();
        storage.fail_writes();

        assert!(matches!(
            store.add(new_reminder("Lost", 0.0, 0.0, 10.0)),
            Err(TrackerError::Storage { .. })
        ));
        assert_eq!(store.list(), &[kept.clone()]);

        assert!(store.delete(&kept.id).is_err());
        assert_eq!(store.list(), &[kept.clone()]);

        assert!(store.toggle_complete(&kept.id).is_err());
        assert!(!store.get(&kept.id).unwrap().is_completed);
    }

    #[test]
    fn test_corrupt_blob_is_empty() {
        let storage = MemoryStorage::new();
        storage.set("reminders", "[{\"id\": 1}]").unwrap();
        assert!(open(&storage).list().is_empty());
    }
}
