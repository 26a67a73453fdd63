//! Real-time air-quality telemetry pipeline
//!
//! Sensor readings arrive from an MQTT broker, or from a synthetic generator
//! when no broker is reachable. Each reading is validated, scored with an AQI
//! value, stored as the latest state for its sensor, and pushed as JSON to
//! every connected WebSocket subscriber.
//!
//! ```text
//!   LiveProducer ─┐
//!                 ├─► RawEvent ─► IngestWorker ─► StateRegistry
//!   Synthetic ────┘                    │
//!                                      ▼ Notification
//!                               broadcast pump ─► ConnectionManager ─► subscribers
//! ```
//!
//! [`Pipeline`] owns the whole chain and its lifecycle. [`TelemetryServer`]
//! accepts WebSocket connections and registers them with a pipeline.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use airsense_rs::{Pipeline, PipelineConfig, ServerConfig, TelemetryServer};
//!
//! #[tokio::main]
//! async fn main() -> airsense_rs::Result<()> {
//!     let pipeline = Arc::new(Pipeline::new(PipelineConfig::default()));
//!     pipeline.start().await?;
//!
//!     let server = TelemetryServer::new(ServerConfig::default(), Arc::clone(&pipeline));
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     pipeline.shutdown().await
//! }
//! ```

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod producer;
pub mod reading;
pub mod registry;
pub mod server;
pub mod stats;
pub mod store;

#[cfg(test)]
mod testing;

pub use broadcast::{ConnectionId, ConnectionManager, PushMessage, SubscriberSink};
pub use clock::{Clock, SharedClock, SystemClock};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use ingest::{Alert, AlertSeverity};
pub use lifecycle::{LifecyclePhase, Pipeline, PipelineConfig};
pub use producer::{BrokerConfig, ProducerKind, RawEvent, SyntheticConfig};
pub use reading::{Reading, SensorId};
pub use registry::{RegistrySnapshot, StateRegistry};
pub use server::{ServerConfig, TelemetryServer, WsSink};
pub use stats::PipelineStats;
pub use store::{MemoryStore, ReadingStore};
