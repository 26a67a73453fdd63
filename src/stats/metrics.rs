//! Pipeline counters and health statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broadcast::DeliveryReport;
use crate::lifecycle::LifecyclePhase;
use crate::producer::ProducerKind;

/// Running totals shared by the pipeline tasks
#[derive(Debug, Default)]
pub struct PipelineCounters {
    events_received: AtomicU64,
    readings_ingested: AtomicU64,
    readings_rejected: AtomicU64,
    status_updates: AtomicU64,
    state_broadcasts: AtomicU64,
    frames_delivered: AtomicU64,
    push_failures: AtomicU64,
    alerts_raised: AtomicU64,
    persist_dropped: AtomicU64,
}

impl PipelineCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingested(&self) {
        self.readings_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.readings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self) {
        self.status_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_dropped(&self) {
        self.persist_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one state broadcast and its per-subscriber outcome
    pub fn record_state_broadcast(&self, report: &DeliveryReport) {
        self.state_broadcasts.fetch_add(1, Ordering::Relaxed);
        self.record_delivery(report);
    }

    /// Count per-subscriber outcomes of any fan-out
    pub fn record_delivery(&self, report: &DeliveryReport) {
        self.frames_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.push_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            readings_ingested: self.readings_ingested.load(Ordering::Relaxed),
            readings_rejected: self.readings_rejected.load(Ordering::Relaxed),
            status_updates: self.status_updates.load(Ordering::Relaxed),
            state_broadcasts: self.state_broadcasts.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            persist_dropped: self.persist_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Raw events handed to the ingest stage
    pub events_received: u64,
    /// Readings written to the registry
    pub readings_ingested: u64,
    /// Events dropped by the normalizer
    pub readings_rejected: u64,
    /// Sensor status reports handled
    pub status_updates: u64,
    /// `sensor_update` fan-outs
    pub state_broadcasts: u64,
    /// Frames accepted by subscribers
    pub frames_delivered: u64,
    /// Subscribers dropped after a failed write
    pub push_failures: u64,
    /// Alerts fired
    pub alerts_raised: u64,
    /// Readings not persisted because the queue was full
    pub persist_dropped: u64,
}

/// Health view of the whole pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub phase: LifecyclePhase,
    /// Producer in use, once started
    pub producer: Option<ProducerKind>,
    pub active_connections: usize,
    pub tracked_sensors: usize,
    /// Timestamp of the newest reading in the registry
    pub last_update: Option<DateTime<Utc>>,
    /// Time since the pipeline entered `running`
    #[serde(serialize_with = "serialize_secs")]
    pub uptime: Duration,
    #[serde(flatten)]
    pub counters: CounterSnapshot,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}
