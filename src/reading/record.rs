//! Canonical reading record

use std::borrow::Borrow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aqi::AqiCategory;

/// Identity of a sensor (e.g. "sensor_001")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    /// Create a new sensor id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SensorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SensorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for SensorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Named measurements carried by a reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Fine particulate matter, µg/m³
    pub pm25: f64,
    /// Coarse particulate matter, µg/m³
    pub pm10: f64,
    /// Carbon dioxide, ppm
    pub co2: f64,
    /// Temperature, °C
    pub temperature: f64,
    /// Relative humidity, %
    pub humidity: f64,
    /// Barometric pressure, hPa
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
}

/// One sensor's measurement snapshot
///
/// Immutable once built. A newer reading for the same sensor supersedes it in
/// the registry rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: SensorId,
    #[serde(flatten)]
    pub measurements: Measurements,
    /// Derived air-quality index, `0..=500`
    pub aqi: u16,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Assemble a reading
    pub fn new(
        sensor_id: SensorId,
        measurements: Measurements,
        aqi: u16,
        location: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id,
            measurements,
            aqi,
            location: location.into(),
            timestamp,
        }
    }

    /// Health category of this reading's index
    pub fn category(&self) -> AqiCategory {
        AqiCategory::from_index(self.aqi)
    }
}

/// Reported operating status of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Online,
    Offline,
    Maintenance,
}

impl SensorStatus {
    /// Parse a status string as sent by sensors
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "online" => Some(SensorStatus::Online),
            "offline" => Some(SensorStatus::Offline),
            "maintenance" => Some(SensorStatus::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SensorStatus::Online => "online",
            SensorStatus::Offline => "offline",
            SensorStatus::Maintenance => "maintenance",
        };
        f.write_str(s)
    }
}
