//! Telemetry producers
//!
//! A producer emits [`RawEvent`]s into a channel until it is stopped. Two
//! variants exist and are interchangeable from the pipeline's point of view:
//!
//! ```text
//!   LiveProducer ──┐   (broker: {root}/sensors/+/{category})
//!                  ├──► mpsc<RawEvent> ──► ingest worker
//!   SyntheticProducer ┘ (fixed roster, fixed cadence)
//! ```
//!
//! The lifecycle controller decides which one runs and holds it as an
//! [`ActiveProducer`].

pub mod config;
pub mod event;
pub mod live;
pub mod roster;
pub mod synthetic;
pub mod topic;

use std::future::Future;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::Result;

pub use config::{BrokerConfig, SyntheticConfig};
pub use event::{decode_publish, DecodeError, RawEvent};
pub use live::{LinkStatus, LiveProducer};
pub use roster::{default_roster, SensorSpec};
pub use synthetic::SyntheticProducer;
pub use topic::{SensorCategory, TopicScheme};

/// Channel producers emit into
pub type EventSender = mpsc::Sender<RawEvent>;

/// Which producer variant is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    Live,
    Synthetic,
}

impl std::fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerKind::Live => f.write_str("live"),
            ProducerKind::Synthetic => f.write_str("synthetic"),
        }
    }
}

/// Source of raw sensor events
pub trait TelemetryProducer: Send {
    /// Begin emitting into `events`
    ///
    /// Fails if the producer is already running or cannot reach its source.
    fn start(&mut self, events: EventSender) -> impl Future<Output = Result<()>> + Send;

    /// Stop emitting; takes effect at the producer's next suspension point
    fn stop(&mut self) -> impl Future<Output = ()> + Send;

    /// Variant tag
    fn kind(&self) -> ProducerKind;

    /// Whether the background task is alive
    fn is_running(&self) -> bool;
}

/// The producer the controller selected at startup
pub enum ActiveProducer {
    Live(LiveProducer),
    Synthetic(SyntheticProducer),
}

impl ActiveProducer {
    /// Live producer, if that is what is running
    pub fn as_live(&self) -> Option<&LiveProducer> {
        match self {
            ActiveProducer::Live(live) => Some(live),
            ActiveProducer::Synthetic(_) => None,
        }
    }
}

impl TelemetryProducer for ActiveProducer {
    async fn start(&mut self, events: EventSender) -> Result<()> {
        match self {
            ActiveProducer::Live(p) => p.start(events).await,
            ActiveProducer::Synthetic(p) => p.start(events).await,
        }
    }

    async fn stop(&mut self) {
        match self {
            ActiveProducer::Live(p) => p.stop().await,
            ActiveProducer::Synthetic(p) => p.stop().await,
        }
    }

    fn kind(&self) -> ProducerKind {
        match self {
            ActiveProducer::Live(p) => p.kind(),
            ActiveProducer::Synthetic(p) => p.kind(),
        }
    }

    fn is_running(&self) -> bool {
        match self {
            ActiveProducer::Live(p) => p.is_running(),
            ActiveProducer::Synthetic(p) => p.is_running(),
        }
    }
}
