//! Pipeline configuration

use std::time::Duration;

use serde::Deserialize;

use crate::broadcast::DEFAULT_WELCOME;
use crate::ingest::AlertThresholds;
use crate::producer::{BrokerConfig, SyntheticConfig};

/// Pipeline configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Live producer
    pub broker: BrokerConfig,

    /// Synthetic fallback producer
    pub synthetic: SyntheticConfig,

    /// Capacity of the producer to ingest channel
    pub event_queue_capacity: usize,

    /// Capacity of the ingest to broadcast channel
    pub notify_queue_capacity: usize,

    /// Capacity of the persistence queue
    pub persist_queue_capacity: usize,

    /// Keep-alive probe period
    #[serde(deserialize_with = "crate::config::secs::deserialize")]
    pub probe_interval: Duration,

    /// Periodic full-state re-broadcast (None = only on change)
    #[serde(deserialize_with = "crate::config::secs::option::deserialize")]
    pub refresh_interval: Option<Duration>,

    /// Alert bounds
    pub alerts: AlertThresholds,

    /// Text of the welcome message
    pub welcome_message: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            synthetic: SyntheticConfig::default(),
            event_queue_capacity: 1024,
            notify_queue_capacity: 256,
            persist_queue_capacity: 1024,
            probe_interval: Duration::from_secs(30),
            refresh_interval: Some(Duration::from_secs(5)),
            alerts: AlertThresholds::default(),
            welcome_message: DEFAULT_WELCOME.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Set the live producer options
    pub fn broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }

    /// Set the synthetic producer options
    pub fn synthetic(mut self, synthetic: SyntheticConfig) -> Self {
        self.synthetic = synthetic;
        self
    }

    /// Set the probe period
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Set the refresh period
    pub fn refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set alert bounds
    pub fn alerts(mut self, alerts: AlertThresholds) -> Self {
        self.alerts = alerts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();

        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert_eq!(config.refresh_interval, Some(Duration::from_secs(5)));
        assert_eq!(config.welcome_message, DEFAULT_WELCOME);
        assert!(config.broker.enabled);
        assert_eq!(config.synthetic.roster.len(), 3);
    }

    #[test]
    fn test_builder_chaining() {
        let config = PipelineConfig::default()
            .broker(BrokerConfig::default().disabled())
            .probe_interval(Duration::from_secs(3))
            .refresh_interval(None);

        assert!(!config.broker.enabled);
        assert_eq!(config.probe_interval, Duration::from_secs(3));
        assert_eq!(config.refresh_interval, None);
    }
}
