//! Point-in-time copies of the registry

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::reading::{Reading, SensorId};

/// Immutable copy of the registry taken at one instant
///
/// Serializes as a map from sensor id to that sensor's latest reading.
/// Readings are shared with the registry through `Arc`, so taking a snapshot
/// copies pointers, not measurement data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RegistrySnapshot {
    readings: BTreeMap<SensorId, Arc<Reading>>,
}

impl RegistrySnapshot {
    pub(super) fn new(readings: BTreeMap<SensorId, Arc<Reading>>) -> Self {
        Self { readings }
    }

    /// Latest reading for a sensor
    pub fn get(&self, sensor_id: &str) -> Option<&Reading> {
        self.readings.get(sensor_id).map(Arc::as_ref)
    }

    /// Number of sensors in the snapshot
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether the snapshot holds no readings
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Iterate readings in sensor id order
    pub fn iter(&self) -> impl Iterator<Item = (&SensorId, &Reading)> {
        self.readings.iter().map(|(id, reading)| (id, reading.as_ref()))
    }

    /// Sensor ids in the snapshot
    pub fn sensor_ids(&self) -> impl Iterator<Item = &SensorId> {
        self.readings.keys()
    }
}
