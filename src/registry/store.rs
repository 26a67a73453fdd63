//! Latest-state registry implementation
//!
//! Holds the most recent reading per sensor. Writers replace whole entries,
//! so a reader sees either the previous `Arc<Reading>` or the new one, never
//! a half-written record.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::snapshot::RegistrySnapshot;
use crate::reading::{Reading, SensorId};

/// Map from sensor id to latest reading
///
/// Thread-safe via `RwLock`. Snapshots and point lookups share the read
/// lock; an upsert holds the write lock only for one map insert.
pub struct StateRegistry {
    /// Latest reading per sensor
    readings: RwLock<HashMap<SensorId, Arc<Reading>>>,

    /// Newest reading timestamp seen; only written under the `readings` write lock
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl StateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(HashMap::new()),
            last_update: RwLock::new(None),
        }
    }

    /// Replace the entry for the reading's sensor
    ///
    /// Returns the reading it superseded, if any.
    pub async fn upsert(&self, reading: Reading) -> Option<Arc<Reading>> {
        let timestamp = reading.timestamp;
        let sensor_id = reading.sensor_id.clone();

        let previous = {
            let mut readings = self.readings.write().await;
            let previous = readings.insert(sensor_id.clone(), Arc::new(reading));
            let mut last_update = self.last_update.write().await;
            *last_update = (*last_update).max(Some(timestamp));
            previous
        };

        tracing::trace!(
            sensor = %sensor_id,
            replaced = previous.is_some(),
            "Registry entry updated"
        );

        previous
    }

    /// Copy the whole mapping at a single point in time
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let readings = self.readings.read().await;
        RegistrySnapshot::new(
            readings
                .iter()
                .map(|(id, reading)| (id.clone(), Arc::clone(reading)))
                .collect(),
        )
    }

    /// Latest reading for one sensor
    pub async fn get(&self, sensor_id: &str) -> Option<Arc<Reading>> {
        self.readings.read().await.get(sensor_id).cloned()
    }

    /// Number of sensors with a reading
    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    /// Whether no reading has been stored yet
    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }

    /// Timestamp of the newest reading stored so far
    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read().await
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}
