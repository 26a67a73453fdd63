//! Raw events handed from producers to the ingestion stage

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::topic::{SensorCategory, TopicScheme};
use crate::reading::SensorId;

/// One inbound sensor message, not yet validated
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Sensor the message belongs to
    pub sensor_id: SensorId,
    /// Measurement category of the source topic
    pub category: SensorCategory,
    /// Source topic
    pub topic: String,
    /// Arrival time stamped by the producer
    pub received_at: DateTime<Utc>,
    /// Payload fields as sent by the sensor
    pub payload: Map<String, Value>,
}

impl RawEvent {
    /// Numeric payload field, if present and finite
    pub fn number(&self, field: &str) -> Option<f64> {
        self.payload
            .get(field)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }

    /// String payload field, if present
    pub fn text(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }
}

/// Reasons a broker message could not be turned into a [`RawEvent`]
#[derive(Debug)]
pub enum DecodeError {
    /// Topic does not follow the sensor data layout
    UnknownTopic(String),
    /// Payload is not valid JSON
    Json(serde_json::Error),
    /// Payload is JSON but not an object
    NotAnObject,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnknownTopic(topic) => write!(f, "Unrecognised topic: {}", topic),
            DecodeError::Json(e) => write!(f, "Invalid JSON payload: {}", e),
            DecodeError::NotAnObject => write!(f, "Payload is not a JSON object"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode one broker publish into a raw event
pub fn decode_publish(
    topics: &TopicScheme,
    topic: &str,
    payload: &Bytes,
    received_at: DateTime<Utc>,
) -> Result<RawEvent, DecodeError> {
    let (sensor_id, category) = topics
        .parse(topic)
        .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;

    let payload = match serde_json::from_slice::<Value>(payload).map_err(DecodeError::Json)? {
        Value::Object(map) => map,
        _ => return Err(DecodeError::NotAnObject),
    };

    Ok(RawEvent {
        sensor_id,
        category,
        topic: topic.to_string(),
        received_at,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_decode_publish() {
        let payload = Bytes::from_static(br#"{"pm25": 14.5, "pm10": 22.0}"#);
        let event = decode_publish(
            &TopicScheme::default(),
            "airsense/sensors/sensor_001/air_quality",
            &payload,
            at(),
        )
        .unwrap();

        assert_eq!(event.sensor_id.as_str(), "sensor_001");
        assert_eq!(event.category, SensorCategory::AirQuality);
        assert_eq!(event.topic, "airsense/sensors/sensor_001/air_quality");
        assert_eq!(event.received_at, at());
        assert_eq!(event.number("pm25"), Some(14.5));
        assert_eq!(event.number("co2"), None);
    }

    #[test]
    fn test_decode_rejects_bad_json() {
        let payload = Bytes::from_static(b"{not json");
        let result = decode_publish(
            &TopicScheme::default(),
            "airsense/sensors/s1/air_quality",
            &payload,
            at(),
        );
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let payload = Bytes::from_static(b"[1, 2, 3]");
        let result = decode_publish(
            &TopicScheme::default(),
            "airsense/sensors/s1/air_quality",
            &payload,
            at(),
        );
        assert!(matches!(result, Err(DecodeError::NotAnObject)));
    }

    #[test]
    fn test_decode_rejects_unknown_topic() {
        let payload = Bytes::from_static(b"{}");
        let result = decode_publish(&TopicScheme::default(), "airsense/other", &payload, at());
        assert!(matches!(result, Err(DecodeError::UnknownTopic(_))));
    }

    #[test]
    fn test_number_ignores_non_numeric() {
        let payload = Bytes::from_static(br#"{"pm25": "12", "co2": null}"#);
        let event = decode_publish(
            &TopicScheme::default(),
            "airsense/sensors/s1/air_quality",
            &payload,
            at(),
        )
        .unwrap();

        assert_eq!(event.number("pm25"), None);
        assert_eq!(event.number("co2"), None);
    }
}
