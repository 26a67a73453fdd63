//! Threshold alerts
//!
//! Alerts are edge-triggered: a condition fires once when it becomes active
//! for a sensor and re-arms only after a reading where it is clear again.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::normalizer::StatusUpdate;
use crate::reading::{Reading, SensorId, SensorStatus};

/// Alert condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighPm25,
    HighPm10,
    HighCo2,
    TemperatureExtreme,
    HumidityExtreme,
    SensorOffline,
}

/// Alert severity, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Moderate,
    High,
    Critical,
}

impl AlertSeverity {
    /// Severity of a reading that exceeds its ceiling by `ratio` (value / threshold)
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 1.5 {
            AlertSeverity::Moderate
        } else if ratio < 2.0 {
            AlertSeverity::High
        } else {
            AlertSeverity::Critical
        }
    }
}

/// One fired alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub sensor_id: SensorId,
    #[serde(rename = "alert_type")]
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    /// Observed value that tripped the rule
    pub value: f64,
    /// Bound that was crossed
    pub threshold: f64,
    pub active: bool,
    #[serde(rename = "created_at")]
    pub raised_at: DateTime<Utc>,
}

/// Alert bounds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// PM2.5 ceiling, µg/m³
    pub pm25: f64,
    /// PM10 ceiling, µg/m³
    pub pm10: f64,
    /// CO2 ceiling, ppm
    pub co2: f64,
    /// Temperature band, °C
    pub temperature_min: f64,
    pub temperature_max: f64,
    /// Relative humidity band, %
    pub humidity_min: f64,
    pub humidity_max: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            pm25: 25.0,
            pm10: 50.0,
            co2: 1000.0,
            temperature_min: 0.0,
            temperature_max: 35.0,
            humidity_min: 20.0,
            humidity_max: 85.0,
        }
    }
}

/// Tracks which conditions are active per sensor
#[derive(Debug, Default)]
pub struct AlertTracker {
    thresholds: AlertThresholds,
    active: HashSet<(SensorId, AlertKind)>,
}

impl AlertTracker {
    /// Create a tracker with the given bounds
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            active: HashSet::new(),
        }
    }

    /// Evaluate a reading, returning alerts that just became active
    pub fn evaluate(&mut self, reading: &Reading) -> Vec<Alert> {
        let t = &self.thresholds;
        let m = &reading.measurements;

        let candidates = [
            (AlertKind::HighPm25, ceiling(m.pm25, t.pm25, "PM2.5", "µg/m³")),
            (AlertKind::HighPm10, ceiling(m.pm10, t.pm10, "PM10", "µg/m³")),
            (AlertKind::HighCo2, ceiling(m.co2, t.co2, "CO2", "ppm")),
            (
                AlertKind::TemperatureExtreme,
                band(m.temperature, t.temperature_min, t.temperature_max, "Temperature", "°C"),
            ),
            (
                AlertKind::HumidityExtreme,
                band(m.humidity, t.humidity_min, t.humidity_max, "Humidity", "%")
                    .map(|(_, threshold, message)| (AlertSeverity::Low, threshold, message)),
            ),
        ];

        let mut fired = Vec::new();
        for (kind, breach) in candidates {
            let key = (reading.sensor_id.clone(), kind);
            match breach {
                Some((severity, threshold, message)) => {
                    if self.active.insert(key) {
                        fired.push(Alert {
                            sensor_id: reading.sensor_id.clone(),
                            kind,
                            severity,
                            message,
                            value: value_of(kind, reading),
                            threshold,
                            active: true,
                            raised_at: reading.timestamp,
                        });
                    }
                }
                None => {
                    self.active.remove(&key);
                }
            }
        }

        fired
    }

    /// Track a status change; an offline report fires once until the sensor returns
    pub fn status_changed(&mut self, update: &StatusUpdate) -> Option<Alert> {
        let key = (update.sensor_id.clone(), AlertKind::SensorOffline);
        match update.status {
            SensorStatus::Offline => self.active.insert(key).then(|| Alert {
                sensor_id: update.sensor_id.clone(),
                kind: AlertKind::SensorOffline,
                severity: AlertSeverity::High,
                message: format!("Sensor {} reported offline", update.sensor_id),
                value: 0.0,
                threshold: 0.0,
                active: true,
                raised_at: update.at,
            }),
            SensorStatus::Online | SensorStatus::Maintenance => {
                self.active.remove(&key);
                None
            }
        }
    }

    /// Whether a condition is currently active for a sensor
    pub fn is_active(&self, sensor_id: &SensorId, kind: AlertKind) -> bool {
        self.active.contains(&(sensor_id.clone(), kind))
    }
}

fn value_of(kind: AlertKind, reading: &Reading) -> f64 {
    let m = &reading.measurements;
    match kind {
        AlertKind::HighPm25 => m.pm25,
        AlertKind::HighPm10 => m.pm10,
        AlertKind::HighCo2 => m.co2,
        AlertKind::TemperatureExtreme => m.temperature,
        AlertKind::HumidityExtreme => m.humidity,
        AlertKind::SensorOffline => 0.0,
    }
}

fn ceiling(value: f64, limit: f64, name: &str, unit: &str) -> Option<(AlertSeverity, f64, String)> {
    (value > limit).then(|| {
        let ratio = if limit > 0.0 { value / limit } else { f64::INFINITY };
        (
            AlertSeverity::from_ratio(ratio),
            limit,
            format!("{} at {:.1} {} exceeds {:.1}", name, value, unit, limit),
        )
    })
}

fn band(value: f64, min: f64, max: f64, name: &str, unit: &str) -> Option<(AlertSeverity, f64, String)> {
    let (bound, distance, side) = if value < min {
        (min, min - value, "below")
    } else if value > max {
        (max, value - max, "above")
    } else {
        return None;
    };

    let severity = if distance >= 10.0 {
        AlertSeverity::High
    } else {
        AlertSeverity::Moderate
    };

    Some((
        severity,
        bound,
        format!("{} at {:.1} {} is {} {:.1}", name, value, unit, side, bound),
    ))
}
