//! Raw event to canonical reading
//!
//! Each measurement topic must carry its own fields. Fields it does not carry
//! are taken from the sensor's current reading, so a `temperature` message
//! yields a complete reading that supersedes the previous one. A message that
//! leaves any core measurement unknown is rejected whole and the registry never
//! holds partial state. Status topics become [`StatusUpdate`]s and never touch
//! the registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::error::IngestError;
use crate::producer::{RawEvent, SensorCategory, SensorSpec};
use crate::reading::{compute_index, Measurements, Reading, SensorId, SensorStatus};

/// Measurement fields every reading must carry
pub const REQUIRED_FIELDS: [&str; 5] = ["pm25", "pm10", "co2", "temperature", "humidity"];

/// Fields a message on `category` must carry itself
pub fn category_fields(category: SensorCategory) -> &'static [&'static str] {
    match category {
        SensorCategory::AirQuality => &["pm25", "pm10", "co2"],
        SensorCategory::Temperature => &["temperature"],
        SensorCategory::Humidity => &["humidity"],
        SensorCategory::Status => &["status"],
    }
}

/// Location used when neither the payload nor the roster names one
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Reported status change of one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub sensor_id: SensorId,
    pub status: SensorStatus,
    pub at: DateTime<Utc>,
}

/// Result of normalizing one event
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Reading(Reading),
    Status(StatusUpdate),
}

/// Validates raw events and builds readings
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    /// Known sensor locations, used when a payload omits its own
    locations: HashMap<SensorId, String>,
}

impl Normalizer {
    /// Normalizer without roster knowledge
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer that falls back to roster locations
    pub fn with_roster(roster: &[SensorSpec]) -> Self {
        Self {
            locations: roster
                .iter()
                .map(|spec| (spec.id.clone(), spec.location.clone()))
                .collect(),
        }
    }

    /// Turn one raw event into a reading or a status update
    ///
    /// `current` is the sensor's latest reading; measurement messages fill
    /// the fields they do not carry from it.
    pub fn normalize(&self, event: &RawEvent, current: Option<&Reading>) -> Result<Normalized, IngestError> {
        match event.category {
            SensorCategory::Status => self.status(event).map(Normalized::Status),
            _ => self.reading(event, current).map(Normalized::Reading),
        }
    }

    fn reading(&self, event: &RawEvent, current: Option<&Reading>) -> Result<Reading, IngestError> {
        let own = category_fields(event.category);
        let base = current.map(|reading| reading.measurements);
        let field = |name: &'static str, previous: Option<f64>| -> Result<f64, IngestError> {
            match event.payload.get(name) {
                Some(value) => event.number(name).ok_or_else(|| IngestError::InvalidField {
                    field: name,
                    value: value.to_string(),
                }),
                None if own.contains(&name) => Err(IngestError::MissingField(name)),
                None => previous.ok_or(IngestError::MissingField(name)),
            }
        };

        let [pm25, pm10, co2, temperature, humidity] = REQUIRED_FIELDS;
        let measurements = Measurements {
            pm25: field(pm25, base.map(|m| m.pm25))?,
            pm10: field(pm10, base.map(|m| m.pm10))?,
            co2: field(co2, base.map(|m| m.co2))?,
            temperature: field(temperature, base.map(|m| m.temperature))?,
            humidity: field(humidity, base.map(|m| m.humidity))?,
            pressure: event
                .number("pressure")
                .or_else(|| base.and_then(|m| m.pressure)),
        };

        let location = match (event.text("location"), current) {
            (Some(location), _) if !location.is_empty() => location.to_string(),
            (_, Some(reading)) => reading.location.clone(),
            _ => self
                .locations
                .get(&event.sensor_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        };

        Ok(Reading::new(
            event.sensor_id.clone(),
            measurements,
            compute_index(measurements.pm25),
            location,
            event.received_at,
        ))
    }

    fn status(&self, event: &RawEvent) -> Result<StatusUpdate, IngestError> {
        let raw = event
            .payload
            .get("status")
            .ok_or(IngestError::MissingField("status"))?;

        let status = raw
            .as_str()
            .and_then(SensorStatus::parse)
            .ok_or_else(|| IngestError::InvalidField {
                field: "status",
                value: raw.to_string(),
            })?;

        Ok(StatusUpdate {
            sensor_id: event.sensor_id.clone(),
            status,
            at: event.received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::{json, Map, Value};

    use super::*;
    use crate::producer::default_roster;

    fn event(category: SensorCategory, payload: Value) -> RawEvent {
        let payload: Map<String, Value> = payload.as_object().unwrap().clone();
        RawEvent {
            sensor_id: SensorId::new("sensor_001"),
            category,
            topic: format!("airsense/sensors/sensor_001/{}", category),
            received_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            payload,
        }
    }

    fn full_payload() -> Value {
        json!({
            "pm25": 20.0,
            "pm10": 34.0,
            "co2": 450.0,
            "temperature": 22.5,
            "humidity": 48.0,
            "location": "Rooftop"
        })
    }

    #[test]
    fn test_complete_reading() {
        let normalizer = Normalizer::new();

        let result = normalizer
            .normalize(&event(SensorCategory::AirQuality, full_payload()), None)
            .unwrap();

        let Normalized::Reading(reading) = result else {
            panic!("expected a reading");
        };
        assert_eq!(reading.sensor_id.as_str(), "sensor_001");
        assert_eq!(reading.aqi, compute_index(20.0));
        assert_eq!(reading.location, "Rooftop");
        assert_eq!(reading.measurements.pressure, None);
        assert_eq!(
            reading.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_field_rejected() {
        let normalizer = Normalizer::new();
        let mut payload = full_payload();
        payload.as_object_mut().unwrap().remove("co2");

        let result = normalizer.normalize(&event(SensorCategory::AirQuality, payload), None);

        assert_eq!(result, Err(IngestError::MissingField("co2")));
    }

    #[test]
    fn test_non_numeric_field_rejected() {
        let normalizer = Normalizer::new();
        let mut payload = full_payload();
        payload["humidity"] = json!("damp");

        let result = normalizer.normalize(&event(SensorCategory::Humidity, payload), None);

        assert!(matches!(
            result,
            Err(IngestError::InvalidField { field: "humidity", .. })
        ));
    }

    fn current() -> Reading {
        let Ok(Normalized::Reading(reading)) = Normalizer::new()
            .normalize(&event(SensorCategory::AirQuality, full_payload()), None)
        else {
            panic!("expected a reading");
        };
        reading
    }

    #[test]
    fn test_category_message_merges_onto_current() {
        let normalizer = Normalizer::new();
        let previous = current();

        let result = normalizer
            .normalize(
                &event(SensorCategory::Temperature, json!({"temperature": 21.5})),
                Some(&previous),
            )
            .unwrap();

        let Normalized::Reading(reading) = result else {
            panic!("expected a reading");
        };
        assert_eq!(reading.measurements.temperature, 21.5);
        assert_eq!(reading.measurements.pm25, previous.measurements.pm25);
        assert_eq!(reading.measurements.humidity, previous.measurements.humidity);
        assert_eq!(reading.aqi, previous.aqi);
        assert_eq!(reading.location, "Rooftop");
    }

    #[test]
    fn test_air_quality_update_recomputes_index() {
        let normalizer = Normalizer::new();
        let previous = current();

        let Ok(Normalized::Reading(reading)) = normalizer.normalize(
            &event(
                SensorCategory::AirQuality,
                json!({"pm25": 60.0, "pm10": 70.0, "co2": 900.0}),
            ),
            Some(&previous),
        ) else {
            panic!("expected a reading");
        };
        assert_eq!(reading.aqi, compute_index(60.0));
        assert_eq!(reading.measurements.temperature, previous.measurements.temperature);
    }

    #[test]
    fn test_category_message_without_current_rejected() {
        let normalizer = Normalizer::new();

        let result = normalizer.normalize(
            &event(SensorCategory::Temperature, json!({"temperature": 21.0})),
            None,
        );

        assert_eq!(result, Err(IngestError::MissingField("pm25")));
    }

    #[test]
    fn test_category_must_carry_own_field() {
        let normalizer = Normalizer::new();
        let previous = current();

        let result = normalizer.normalize(
            &event(SensorCategory::Humidity, json!({"temperature": 19.0})),
            Some(&previous),
        );

        assert_eq!(result, Err(IngestError::MissingField("humidity")));
    }

    #[test]
    fn test_location_falls_back_to_roster() {
        let normalizer = Normalizer::with_roster(&default_roster());
        let mut payload = full_payload();
        payload.as_object_mut().unwrap().remove("location");

        let Ok(Normalized::Reading(reading)) =
            normalizer.normalize(&event(SensorCategory::AirQuality, payload.clone()), None)
        else {
            panic!("expected a reading");
        };
        assert_eq!(reading.location, "Downtown Station");

        let Ok(Normalized::Reading(reading)) =
            Normalizer::new().normalize(&event(SensorCategory::AirQuality, payload), None)
        else {
            panic!("expected a reading");
        };
        assert_eq!(reading.location, UNKNOWN_LOCATION);
    }

    #[test]
    fn test_status_event() {
        let normalizer = Normalizer::new();

        let result = normalizer
            .normalize(&event(SensorCategory::Status, json!({"status": "Offline"})), None)
            .unwrap();

        assert_eq!(
            result,
            Normalized::Status(StatusUpdate {
                sensor_id: SensorId::new("sensor_001"),
                status: SensorStatus::Offline,
                at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            })
        );
    }

    #[test]
    fn test_unknown_status_rejected() {
        let normalizer = Normalizer::new();

        let result = normalizer.normalize(&event(SensorCategory::Status, json!({"status": "asleep"})), None);
        assert!(matches!(result, Err(IngestError::InvalidField { field: "status", .. })));

        let result = normalizer.normalize(&event(SensorCategory::Status, json!({})), None);
        assert_eq!(result, Err(IngestError::MissingField("status")));
    }

    #[test]
    fn test_pressure_kept_when_present() {
        let normalizer = Normalizer::new();
        let mut payload = full_payload();
        payload["pressure"] = json!(1012.5);

        let Ok(Normalized::Reading(reading)) =
            normalizer.normalize(&event(SensorCategory::AirQuality, payload), None)
        else {
            panic!("expected a reading");
        };
        assert_eq!(reading.measurements.pressure, Some(1012.5));
    }
}
