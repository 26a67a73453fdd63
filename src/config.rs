//! Configuration file loading
//!
//! The whole process is described by one TOML document:
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [server]
//! bind_addr = "127.0.0.1:8000"
//!
//! [pipeline]
//! probe_interval = 30
//!
//! [pipeline.broker]
//! host = "broker.local"
//!
//! [[pipeline.synthetic.roster]]
//! id = "sensor_001"
//! location = "Downtown Station"
//! ```
//!
//! Every section and field has a default, so an empty file is valid.
//! Durations are written in seconds and may be fractional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::lifecycle::PipelineConfig;
use crate::server::ServerConfig;

/// Root of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Logging section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this crate's targets ("trace" .. "error")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive for this crate at the configured level
    pub fn directive(&self) -> String {
        format!("airsense_rs={}", self.level)
    }
}

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Load the first candidate that exists and parses, else defaults
    pub fn load_or_default(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load(path) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Configuration loaded");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable configuration");
                }
            }
        }

        tracing::warn!("No configuration file found, using defaults");
        Self::default()
    }

    /// Default search locations
    pub fn default_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("config").join("airsense.toml"),
            PathBuf::from("airsense.toml"),
        ]
    }
}

/// Serde helpers for durations written as seconds
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<f64>::deserialize(deserializer)? {
                Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}
