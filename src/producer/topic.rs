//! Broker topic layout
//!
//! Sensors publish on `{root}/sensors/{sensor_id}/{category}` and receive
//! commands on `{root}/sensors/{sensor_id}/commands`.

use serde::{Deserialize, Serialize};

use crate::reading::SensorId;

/// Default topic root
pub const DEFAULT_TOPIC_ROOT: &str = "airsense";

const SENSORS_SEGMENT: &str = "sensors";
const COMMANDS_SEGMENT: &str = "commands";

/// Measurement category carried by a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorCategory {
    AirQuality,
    Temperature,
    Humidity,
    Status,
}

impl SensorCategory {
    /// Every category the live producer subscribes to
    pub const ALL: [SensorCategory; 4] = [
        SensorCategory::AirQuality,
        SensorCategory::Temperature,
        SensorCategory::Humidity,
        SensorCategory::Status,
    ];

    /// Topic segment for this category
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorCategory::AirQuality => "air_quality",
            SensorCategory::Temperature => "temperature",
            SensorCategory::Humidity => "humidity",
            SensorCategory::Status => "status",
        }
    }

    /// Parse a topic segment
    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == segment)
    }
}

impl std::fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic naming under a configurable root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    root: String,
}

impl TopicScheme {
    /// Create a scheme rooted at `root`
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_matches('/').to_string(),
        }
    }

    /// Topic root
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Wildcard subscription filter for one category
    pub fn subscription_filter(&self, category: SensorCategory) -> String {
        format!("{}/{}/+/{}", self.root, SENSORS_SEGMENT, category)
    }

    /// Subscription filters for every category
    pub fn subscription_filters(&self) -> Vec<String> {
        SensorCategory::ALL
            .iter()
            .map(|c| self.subscription_filter(*c))
            .collect()
    }

    /// Concrete data topic for a sensor and category
    pub fn data_topic(&self, sensor_id: &SensorId, category: SensorCategory) -> String {
        format!("{}/{}/{}/{}", self.root, SENSORS_SEGMENT, sensor_id, category)
    }

    /// Command topic for a sensor
    pub fn command_topic(&self, sensor_id: &SensorId) -> String {
        format!(
            "{}/{}/{}/{}",
            self.root, SENSORS_SEGMENT, sensor_id, COMMANDS_SEGMENT
        )
    }

    /// Extract sensor id and category from a data topic
    ///
    /// Returns `None` for topics outside this root, command topics and
    /// unknown categories.
    pub fn parse(&self, topic: &str) -> Option<(SensorId, SensorCategory)> {
        let rest = topic.strip_prefix(self.root.as_str())?.strip_prefix('/')?;
        let mut parts = rest.split('/');

        if parts.next()? != SENSORS_SEGMENT {
            return None;
        }
        let sensor = parts.next().filter(|s| !s.is_empty())?;
        let category = SensorCategory::from_segment(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }

        Some((SensorId::new(sensor), category))
    }
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_ROOT)
    }
}
