//! Record types for the two synchronized collections.

use crate::{error::Result, Error, RecordId};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The collections the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Plants,
    Notifications,
}

impl ResourceKind {
    /// Path segment on the remote API, also used as the storage namespace.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Plants => "plants",
            ResourceKind::Notifications => "notifications",
        }
    }

    /// Storage key of the cached snapshot.
    pub fn cache_key(self) -> String {
        format!("cache.{}", self.as_str())
    }

    /// Storage key of the pending operation log.
    pub fn pending_key(self) -> String {
        format!("pending.{}", self.as_str())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partial update: field name to new value.
///
/// Applied as a shallow merge, so concurrent patches resolve per field with
/// the last writer winning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Map<String, Value>);

impl Patch {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a field.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge into a serialized record. The `id` field is never overwritten.
    pub fn merge_into(&self, target: &mut Value) {
        if let Value::Object(object) = target {
            for (field, value) in &self.0 {
                if field != "id" {
                    object.insert(field.clone(), value.clone());
                }
            }
        }
    }
}

impl From<Map<String, Value>> for Patch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Field equality filters, sent as a query string and evaluable locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(field.into(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Query string pairs in a stable order.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    /// Whether a record's serialized fields equal every filter value.
    pub fn matches<T: Serialize>(&self, record: &T) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let Ok(value) = serde_json::to_value(record) else {
            return false;
        };
        self.0.iter().all(|(field, expected)| match value.get(field) {
            Some(Value::String(actual)) => actual == expected,
            Some(Value::Null) | None => expected == "null",
            Some(other) => other.to_string() == *expected,
        })
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Filters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }
}

/// A record the engine can synchronize.
pub trait Resource:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Payload accepted by the remote when creating a record.
    type Draft: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    const KIND: ResourceKind;

    /// Records carry a read flag the remote can bulk delete by.
    const TRACKS_READ_STATE: bool = false;

    fn id(&self) -> RecordId;

    fn is_read(&self) -> bool {
        false
    }

    /// Apply a patch in place. On error the record is left untouched.
    fn apply_patch(&mut self, patch: &Patch) -> Result<()> {
        let mut value = serde_json::to_value(&*self)?;
        patch.merge_into(&mut value);
        let patched: Self =
            serde_json::from_value(value).map_err(|e| Error::InvalidPatch(e.to_string()))?;
        *self = patched;
        Ok(())
    }
}

/// A monitored plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub watering_interval_days: u32,
    #[serde(default)]
    pub last_watered_at: Option<DateTime<Utc>>,
    /// Computed by the server from the last watering and the interval.
    #[serde(default)]
    pub next_watering_due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub moisture_threshold: Option<f64>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Creation payload for a plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantDraft {
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub watering_interval_days: u32,
    #[serde(default)]
    pub moisture_threshold: Option<f64>,
}

impl Resource for Plant {
    type Draft = PlantDraft;
    const KIND: ResourceKind = ResourceKind::Plants;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A user-facing notification (watering reminders, sensor alerts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: RecordId,
    #[serde(default)]
    pub plant_id: Option<RecordId>,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Creation payload for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    #[serde(default)]
    pub plant_id: Option<RecordId>,
    pub title: String,
    #[serde(default)]
    pub message: String,
}

impl Resource for Notification {
    type Draft = NotificationDraft;
    const KIND: ResourceKind = ResourceKind::Notifications;
    const TRACKS_READ_STATE: bool = true;

    fn id(&self) -> RecordId {
        self.id
    }

    fn is_read(&self) -> bool {
        self.is_read
    }
}
