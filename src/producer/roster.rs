//! Known sensors

use serde::Deserialize;

use crate::reading::SensorId;

/// Static description of one sensor
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorSpec {
    pub id: SensorId,
    pub location: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl SensorSpec {
    /// Create a sensor description
    pub fn new(id: impl Into<String>, location: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: SensorId::new(id),
            location: location.into(),
            latitude,
            longitude,
        }
    }
}

/// Default roster of three stations
pub fn default_roster() -> Vec<SensorSpec> {
    vec![
        SensorSpec::new("sensor_001", "Downtown Station", 43.6532, -79.3832),
        SensorSpec::new("sensor_002", "Suburban Station", 43.5890, -79.6441),
        SensorSpec::new("sensor_003", "Industrial Zone", 43.2557, -79.8711),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster_ids_unique() {
        let roster = default_roster();
        let mut ids: Vec<_> = roster.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids.dedup();

        assert_eq!(roster.len(), 3);
        assert_eq!(ids.len(), 3);
    }
}
