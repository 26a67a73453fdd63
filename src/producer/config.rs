//! Producer configuration

use std::time::Duration;

use serde::Deserialize;

use super::roster::{default_roster, SensorSpec};
use super::topic::{TopicScheme, DEFAULT_TOPIC_ROOT};

/// Live broker producer options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Try the broker at startup (false goes straight to synthetic data)
    pub enabled: bool,

    /// Broker host name
    pub host: String,

    /// Broker port
    pub port: u16,

    /// MQTT client identifier
    pub client_id: String,

    /// Topic root (`{root}/sensors/{id}/{category}`)
    pub topic_root: String,

    /// MQTT keep-alive period
    #[serde(deserialize_with = "crate::config::secs::deserialize")]
    pub keep_alive: Duration,

    /// How long to wait for the broker's connection acknowledgement
    #[serde(deserialize_with = "crate::config::secs::deserialize")]
    pub connect_timeout: Duration,

    /// Capacity of the client's outgoing request queue
    pub request_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 1883,
            client_id: "airsense-pipeline".to_string(),
            topic_root: DEFAULT_TOPIC_ROOT.to_string(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(2),
            request_capacity: 64,
        }
    }
}

impl BrokerConfig {
    /// Set broker host and port
    pub fn address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Skip the broker entirely
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Set connection acknowledgement timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set topic root
    pub fn topic_root(mut self, root: impl Into<String>) -> Self {
        self.topic_root = root.into();
        self
    }

    /// Topic layout under the configured root
    pub fn topics(&self) -> TopicScheme {
        TopicScheme::new(self.topic_root.clone())
    }
}

/// Synthetic generator options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Sensors to synthesize, swept in order
    pub roster: Vec<SensorSpec>,

    /// Pause after each full roster sweep
    #[serde(deserialize_with = "crate::config::secs::deserialize")]
    pub sweep_interval: Duration,

    /// Pause after each sensor within a sweep
    #[serde(deserialize_with = "crate::config::secs::deserialize")]
    pub sensor_pacing: Duration,

    /// Topic root stamped on generated events
    pub topic_root: String,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            roster: default_roster(),
            sweep_interval: Duration::from_secs(10),
            sensor_pacing: Duration::from_millis(500),
            topic_root: DEFAULT_TOPIC_ROOT.to_string(),
        }
    }
}

impl SyntheticConfig {
    /// Replace the roster
    pub fn roster(mut self, roster: Vec<SensorSpec>) -> Self {
        self.roster = roster;
        self
    }

    /// Set sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set per-sensor pacing
    pub fn sensor_pacing(mut self, pacing: Duration) -> Self {
        self.sensor_pacing = pacing;
        self
    }

    /// Topic layout under the configured root
    pub fn topics(&self) -> TopicScheme {
        TopicScheme::new(self.topic_root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_broker_config() {
        let config = BrokerConfig::default();

        assert!(config.enabled);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topics().root(), "airsense");
    }

    #[test]
    fn test_broker_builder_chaining() {
        let config = BrokerConfig::default()
            .address("10.0.0.5", 1884)
            .connect_timeout(Duration::from_millis(250))
            .topic_root("plant")
            .disabled();

        assert!(!config.enabled);
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 1884);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.topics().root(), "plant");
    }

    #[test]
    fn test_default_synthetic_config() {
        let config = SyntheticConfig::default();

        assert_eq!(config.roster.len(), 3);
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.sensor_pacing, Duration::from_millis(500));
    }
}
