//! Ingest worker
//!
//! Single consumer of the producer channel. For each event it normalizes,
//! writes the registry, forwards to persistence, evaluates alerts, and tells
//! the broadcast pump that state changed. Events for one sensor are applied
//! in the order they were received.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::alert::{Alert, AlertTracker};
use super::normalizer::{Normalized, Normalizer};
use crate::producer::{RawEvent, SensorCategory};
use crate::reading::{Reading, SensorId};
use crate::registry::StateRegistry;
use crate::stats::PipelineCounters;

/// Signal from the ingest stage to the broadcast pump
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A sensor's registry entry was replaced
    StateChanged(SensorId),
    /// An alert fired
    Alert(Alert),
}

/// Consumes raw events and applies them to the registry
pub struct IngestWorker {
    normalizer: Normalizer,
    alerts: AlertTracker,
    registry: Arc<StateRegistry>,
    notify: mpsc::Sender<Notification>,
    persist: Option<mpsc::Sender<Reading>>,
    counters: Arc<PipelineCounters>,
}

impl IngestWorker {
    /// Create a worker writing to `registry` and signalling on `notify`
    pub fn new(
        normalizer: Normalizer,
        alerts: AlertTracker,
        registry: Arc<StateRegistry>,
        notify: mpsc::Sender<Notification>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            normalizer,
            alerts,
            registry,
            notify,
            persist: None,
            counters,
        }
    }

    /// Forward accepted readings to a persistence queue
    pub fn with_persistence(mut self, persist: mpsc::Sender<Reading>) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Process events until every producer sender is dropped
    pub async fn run(mut self, mut events: mpsc::Receiver<RawEvent>) {
        tracing::debug!("Ingest worker started");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::debug!("Ingest worker stopped");
    }

    /// Apply one event
    pub async fn handle(&mut self, event: RawEvent) {
        self.counters.record_event();

        // Sole registry writer: this entry is still current at upsert.
        let current = match event.category {
            SensorCategory::Status => None,
            _ => self.registry.get(event.sensor_id.as_str()).await,
        };

        let normalized = match self.normalizer.normalize(&event, current.as_deref()) {
            Ok(normalized) => normalized,
            Err(e) => {
                self.counters.record_rejected();
                tracing::warn!(sensor = %event.sensor_id, topic = %event.topic, error = %e, "Rejected sensor event");
                return;
            }
        };

        match normalized {
            Normalized::Reading(reading) => self.apply_reading(reading).await,
            Normalized::Status(update) => {
                self.counters.record_status();
                tracing::info!(sensor = %update.sensor_id, status = %update.status, "Sensor status changed");
                if let Some(alert) = self.alerts.status_changed(&update) {
                    self.raise(alert).await;
                }
            }
        }
    }

    async fn apply_reading(&mut self, reading: Reading) {
        let sensor_id = reading.sensor_id.clone();
        let fired = self.alerts.evaluate(&reading);

        if let Some(persist) = &self.persist {
            match persist.try_send(reading.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.counters.record_persist_dropped();
                    tracing::warn!(sensor = %sensor_id, "Persistence queue full, reading not stored");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Persistence queue closed");
                    self.persist = None;
                }
            }
        }

        tracing::debug!(sensor = %sensor_id, aqi = reading.aqi, "Reading ingested");
        self.registry.upsert(reading).await;
        self.counters.record_ingested();

        // A full queue already holds a pending change, and the pump snapshots
        // after draining it, so this update is still delivered.
        match self.notify.try_send(Notification::StateChanged(sensor_id)) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("Broadcast pump gone, registry still updated");
            }
        }

        for alert in fired {
            self.raise(alert).await;
        }
    }

    async fn raise(&mut self, alert: Alert) {
        self.counters.record_alert();
        tracing::warn!(
            sensor = %alert.sensor_id,
            kind = ?alert.kind,
            severity = ?alert.severity,
            "{}",
            alert.message
        );
        if self.notify.send(Notification::Alert(alert)).await.is_err() {
            tracing::trace!("Broadcast pump gone, alert not pushed");
        }
    }
}
