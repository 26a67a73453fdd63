//! Lifecycle controller
//!
//! `Pipeline` owns the registry, the connection manager and every background
//! task. It picks the producer at startup (live first, synthetic on failure)
//! and tears everything down in order on shutdown: producer, subscribers,
//! then the remaining tasks.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::config::PipelineConfig;
use super::state::{LifecyclePhase, PhaseCell};
use super::tasks::{self, ProducerSlot};
use crate::broadcast::{
    BroadcastError, ConnectionId, ConnectionManager, Subscriber, SubscriberSink,
};
use crate::clock::{self, SharedClock};
use crate::error::{Error, Result};
use crate::ingest::{AlertTracker, IngestWorker, Normalizer};
use crate::producer::{
    ActiveProducer, EventSender, LiveProducer, ProducerKind, SyntheticProducer, TelemetryProducer,
};
use crate::reading::SensorId;
use crate::registry::{RegistrySnapshot, StateRegistry};
use crate::stats::{PipelineCounters, PipelineStats};
use crate::store::{spawn_persistence, ReadingStore};

/// How long shutdown waits for each background task before aborting it
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The telemetry fan-out pipeline
pub struct Pipeline<S: SubscriberSink> {
    config: PipelineConfig,
    clock: SharedClock,
    registry: Arc<StateRegistry>,
    manager: Arc<ConnectionManager<S>>,
    counters: Arc<PipelineCounters>,
    store: Option<Arc<dyn ReadingStore>>,
    phase: PhaseCell,
    producer: ProducerSlot,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    shutdown: watch::Sender<bool>,
    /// Serializes start against shutdown
    transitions: Mutex<()>,
    started_at: OnceLock<tokio::time::Instant>,
}

impl<S: SubscriberSink> Pipeline<S> {
    /// Create an idle pipeline on the wall clock
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_clock(config, clock::system())
    }

    /// Create an idle pipeline with an explicit time source
    pub fn with_clock(config: PipelineConfig, clock: SharedClock) -> Self {
        let manager = ConnectionManager::with_welcome(clock.clone(), config.welcome_message.clone());
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            clock,
            registry: Arc::new(StateRegistry::new()),
            manager: Arc::new(manager),
            counters: Arc::new(PipelineCounters::new()),
            store: None,
            phase: PhaseCell::new(),
            producer: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
            shutdown,
            transitions: Mutex::new(()),
            started_at: OnceLock::new(),
        }
    }

    /// Forward accepted readings to a store
    pub fn with_store(mut self, store: Arc<dyn ReadingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Latest-state registry
    pub fn registry(&self) -> &Arc<StateRegistry> {
        &self.registry
    }

    /// Subscriber manager
    pub fn manager(&self) -> &Arc<ConnectionManager<S>> {
        &self.manager
    }

    /// Persistence collaborator, if any
    pub fn store(&self) -> Option<&Arc<dyn ReadingStore>> {
        self.store.as_ref()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> LifecyclePhase {
        self.phase.get()
    }

    /// Watch lifecycle phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase.subscribe()
    }

    /// Copy of the latest state of every sensor
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot().await
    }

    /// Producer currently feeding the pipeline
    pub async fn producer_kind(&self) -> Option<ProducerKind> {
        self.producer.lock().await.as_ref().map(|p| p.kind())
    }

    /// Start the pipeline
    ///
    /// Tries the broker first when enabled and falls back to synthetic data
    /// if it cannot connect. Returns the producer that ended up running.
    pub async fn start(&self) -> Result<ProducerKind> {
        let _transitions = self.transitions.lock().await;
        self.phase.transition(LifecyclePhase::Starting)?;
        tracing::info!("Pipeline starting");

        let (event_tx, event_rx) = mpsc::channel(self.config.event_queue_capacity.max(1));
        let (notify_tx, notify_rx) = mpsc::channel(self.config.notify_queue_capacity.max(1));
        let mut handles = Vec::new();

        let mut worker = IngestWorker::new(
            Normalizer::with_roster(&self.config.synthetic.roster),
            AlertTracker::new(self.config.alerts.clone()),
            Arc::clone(&self.registry),
            notify_tx,
            Arc::clone(&self.counters),
        );
        if let Some(store) = &self.store {
            let (persist_tx, handle) =
                spawn_persistence(Arc::clone(store), self.config.persist_queue_capacity);
            worker = worker.with_persistence(persist_tx);
            handles.push(("persistence", handle));
        }
        handles.push(("ingest", tokio::spawn(worker.run(event_rx))));
        handles.push((
            "broadcast",
            tokio::spawn(tasks::run_broadcast_pump(
                notify_rx,
                Arc::clone(&self.registry),
                Arc::clone(&self.manager),
                Arc::clone(&self.counters),
            )),
        ));

        let producer = match self.select_producer(&event_tx).await {
            Ok(producer) => producer,
            Err(e) => {
                tracing::error!(error = %e, "No producer could be started");
                drop(event_tx);
                *self.tasks.lock().await = handles;
                self.teardown().await;
                return Err(e);
            }
        };
        let kind = producer.kind();

        if let Some(live) = producer.as_live() {
            handles.push((
                "supervisor",
                tokio::spawn(tasks::supervise_link(
                    live.watch_status(),
                    Arc::clone(&self.producer),
                    self.config.synthetic.clone(),
                    self.clock.clone(),
                    event_tx.clone(),
                    self.shutdown.subscribe(),
                )),
            ));
        }
        *self.producer.lock().await = Some(producer);
        drop(event_tx);

        handles.push((
            "probe",
            tokio::spawn(tasks::run_probe_ticker(
                self.config.probe_interval,
                Arc::clone(&self.manager),
                Arc::clone(&self.counters),
                self.shutdown.subscribe(),
            )),
        ));
        if let Some(period) = self.config.refresh_interval {
            handles.push((
                "refresh",
                tokio::spawn(tasks::run_refresh_ticker(
                    period,
                    Arc::clone(&self.registry),
                    Arc::clone(&self.manager),
                    Arc::clone(&self.counters),
                    self.shutdown.subscribe(),
                )),
            ));
        }

        *self.tasks.lock().await = handles;
        let _ = self.started_at.set(tokio::time::Instant::now());
        self.phase.transition(LifecyclePhase::Running)?;

        tracing::info!(producer = %kind, "Pipeline running");
        Ok(kind)
    }

    async fn select_producer(&self, events: &EventSender) -> Result<ActiveProducer> {
        if self.config.broker.enabled {
            let mut live = LiveProducer::new(self.config.broker.clone(), self.clock.clone());
            match live.start(events.clone()).await {
                Ok(()) => return Ok(ActiveProducer::Live(live)),
                Err(e) => {
                    tracing::warn!(error = %e, "Broker unavailable, using synthetic data");
                }
            }
        } else {
            tracing::info!("Broker disabled, using synthetic data");
        }

        let mut synthetic = SyntheticProducer::new(self.config.synthetic.clone(), self.clock.clone());
        synthetic.start(events.clone()).await?;
        Ok(ActiveProducer::Synthetic(synthetic))
    }

    /// Stop the pipeline
    ///
    /// Stops the producer, closes every subscriber, drains the remaining
    /// tasks and enters `Stopped`. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let _transitions = self.transitions.lock().await;
        match self.phase.get() {
            LifecyclePhase::Stopping | LifecyclePhase::Stopped => return Ok(()),
            _ => {}
        }
        self.teardown().await;
        Ok(())
    }

    async fn teardown(&self) {
        if let Err(e) = self.phase.transition(LifecyclePhase::Stopping) {
            tracing::debug!(error = %e, "Teardown from unexpected phase");
        }
        tracing::info!("Pipeline stopping");
        self.shutdown.send_replace(true);

        if let Some(mut producer) = self.producer.lock().await.take() {
            producer.stop().await;
        }

        let closed = self.manager.close_all().await;
        tracing::debug!(closed = closed, "Subscribers closed");

        let handles = std::mem::take(&mut *self.tasks.lock().await);
        for (name, mut handle) in handles.into_iter().rev() {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!(task = name, "Task did not stop in time, aborting");
                handle.abort();
            }
        }

        if let Err(e) = self.phase.transition(LifecyclePhase::Stopped) {
            tracing::error!(error = %e, "Failed to enter stopped phase");
        }
        tracing::info!("Pipeline stopped");
    }

    /// Register a subscriber; refused once shutdown has begun
    ///
    /// A subscriber whose welcome is still in flight when teardown closes
    /// the manager is refused as well.
    pub async fn connect(&self, sink: S) -> Result<Arc<Subscriber<S>>> {
        if let LifecyclePhase::Stopping | LifecyclePhase::Stopped = self.phase.get() {
            sink.close().await;
            return Err(Error::ShuttingDown);
        }
        match self.manager.accept(sink).await {
            Ok(subscriber) => Ok(subscriber),
            Err(BroadcastError::Closed) => Err(Error::ShuttingDown),
            Err(e) => Err(e.into()),
        }
    }

    /// Unregister a subscriber
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        self.manager.remove(id).await
    }

    /// Publish a command to a sensor through the broker
    ///
    /// Fails with [`Error::NotConnected`] unless the live producer is running.
    pub async fn publish_command(
        &self,
        sensor_id: &SensorId,
        command: &str,
        extra: Map<String, Value>,
    ) -> Result<()> {
        let producer = self.producer.lock().await;
        match producer.as_ref().and_then(ActiveProducer::as_live) {
            Some(live) => live.publish_command(sensor_id, command, extra).await,
            None => Err(Error::NotConnected),
        }
    }

    /// Health counts
    pub async fn stats(&self) -> PipelineStats {
        PipelineStats {
            phase: self.phase(),
            producer: self.producer_kind().await,
            active_connections: self.manager.connection_count().await,
            tracked_sensors: self.registry.len().await,
            last_update: self.registry.last_update().await,
            uptime: match (self.phase(), self.started_at.get()) {
                (LifecyclePhase::Running, Some(at)) => at.elapsed(),
                _ => Duration::ZERO,
            },
            counters: self.counters.snapshot(),
        }
    }
}
