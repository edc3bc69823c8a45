//! In-memory storage for the resource API.

mod table;

pub use table::Table;

use chrono::{DateTime, Duration, Utc};
use sprout_engine::{Notification, Plant, RecordId, Resource};
use std::sync::Arc;

/// Both resource tables.
#[derive(Debug, Default)]
pub struct Database {
    pub plants: Table<Plant>,
    pub notifications: Table<Notification>,
}

impl Database {
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Server-side rules for a resource stored in the [`Database`].
pub trait Stored: Resource {
    fn table(db: &Database) -> &Table<Self>;

    /// Build a new row from a creation payload.
    fn from_draft(id: RecordId, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    /// Recompute derived fields after a patch.
    fn normalize(&mut self) {}
}

impl Stored for Plant {
    fn table(db: &Database) -> &Table<Self> {
        &db.plants
    }

    fn from_draft(id: RecordId, draft: Self::Draft, _now: DateTime<Utc>) -> Self {
        Plant {
            id,
            name: draft.name,
            species: draft.species,
            location: draft.location,
            watering_interval_days: draft.watering_interval_days,
            last_watered_at: None,
            next_watering_due: None,
            moisture_threshold: draft.moisture_threshold,
            device_id: None,
        }
    }

    fn normalize(&mut self) {
        self.next_watering_due = self
            .last_watered_at
            .map(|at| at + Duration::days(i64::from(self.watering_interval_days)));
    }
}

impl Stored for Notification {
    fn table(db: &Database) -> &Table<Self> {
        &db.notifications
    }

    fn from_draft(id: RecordId, draft: Self::Draft, now: DateTime<Utc>) -> Self {
        Notification {
            id,
            plant_id: draft.plant_id,
            title: draft.title,
            message: draft.message,
            is_read: false,
            created_at: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sprout_engine::Patch;

    #[test]
    fn watering_due_follows_interval() {
        let mut plant = Plant::from_draft(
            1,
            sprout_engine::PlantDraft {
                name: "Basil".into(),
                species: None,
                location: None,
                watering_interval_days: 3,
                moisture_threshold: None,
            },
            Utc::now(),
        );
        let watered = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        plant
            .apply_patch(&Patch::new().set("last_watered_at", serde_json::to_value(watered).unwrap()))
            .unwrap();
        plant.normalize();
        assert_eq!(
            plant.next_watering_due,
            Some(Utc.with_ymd_and_hms(2024, 5, 4, 8, 0, 0).unwrap())
        );
    }
}
