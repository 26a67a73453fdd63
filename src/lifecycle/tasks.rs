//! Background tasks owned by the pipeline
//!
//! Each task ends when its input channel closes or the shutdown flag is set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::broadcast::{ConnectionManager, SubscriberSink};
use crate::clock::SharedClock;
use crate::ingest::{Alert, Notification};
use crate::producer::{
    ActiveProducer, EventSender, LinkStatus, ProducerKind, SyntheticConfig, SyntheticProducer,
    TelemetryProducer,
};
use crate::registry::StateRegistry;
use crate::stats::PipelineCounters;

/// Slot holding whichever producer is active
pub(crate) type ProducerSlot = Arc<Mutex<Option<ActiveProducer>>>;

/// Fan registry changes and alerts out to subscribers
///
/// Notifications that queued up while a broadcast was in flight are drained
/// together, so a burst of readings produces one `sensor_update` carrying the
/// newest state.
pub(crate) async fn run_broadcast_pump<S: SubscriberSink>(
    mut notifications: mpsc::Receiver<Notification>,
    registry: Arc<StateRegistry>,
    manager: Arc<ConnectionManager<S>>,
    counters: Arc<PipelineCounters>,
) {
    while let Some(first) = notifications.recv().await {
        let mut state_changed = false;
        let mut alerts: Vec<Alert> = Vec::new();

        let mut next = Some(first);
        while let Some(notification) = next {
            match notification {
                Notification::StateChanged(_) => state_changed = true,
                Notification::Alert(alert) => alerts.push(alert),
            }
            next = notifications.try_recv().ok();
        }

        if state_changed {
            let snapshot = registry.snapshot().await;
            match manager.broadcast_state(&snapshot).await {
                Ok(report) => counters.record_state_broadcast(&report),
                Err(e) => tracing::error!(error = %e, "State broadcast failed"),
            }
        }

        for alert in &alerts {
            match manager.broadcast_alert(alert).await {
                Ok(report) => counters.record_delivery(&report),
                Err(e) => tracing::error!(error = %e, "Alert broadcast failed"),
            }
        }
    }
    tracing::debug!("Broadcast pump stopped");
}

/// Probe every subscriber on a fixed period
pub(crate) async fn run_probe_ticker<S: SubscriberSink>(
    period: Duration,
    manager: Arc<ConnectionManager<S>>,
    counters: Arc<PipelineCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match manager.probe_liveness().await {
            Ok(report) => {
                counters.record_delivery(&report);
                if report.failed > 0 {
                    tracing::info!(dropped = report.failed, "Liveness probe dropped subscribers");
                }
            }
            Err(e) => tracing::error!(error = %e, "Liveness probe failed"),
        }
    }
    tracing::debug!("Probe ticker stopped");
}

/// Re-broadcast the full registry on a fixed period
pub(crate) async fn run_refresh_ticker<S: SubscriberSink>(
    period: Duration,
    registry: Arc<StateRegistry>,
    manager: Arc<ConnectionManager<S>>,
    counters: Arc<PipelineCounters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        if manager.connection_count().await == 0 {
            continue;
        }
        let snapshot = registry.snapshot().await;
        if snapshot.is_empty() {
            continue;
        }
        match manager.broadcast_state(&snapshot).await {
            Ok(report) => counters.record_state_broadcast(&report),
            Err(e) => tracing::error!(error = %e, "State refresh failed"),
        }
    }
    tracing::debug!("Refresh ticker stopped");
}

/// Replace the live producer with the synthetic one if the broker link drops
pub(crate) async fn supervise_link(
    mut status: watch::Receiver<LinkStatus>,
    slot: ProducerSlot,
    synthetic: SyntheticConfig,
    clock: SharedClock,
    events: EventSender,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = shutdown.changed() => return,
        }

        if *status.borrow_and_update() != LinkStatus::Disconnected {
            continue;
        }

        let mut guard = slot.lock().await;
        if *shutdown.borrow() {
            return;
        }
        let Some(producer) = guard.as_mut() else {
            return;
        };
        if producer.kind() != ProducerKind::Live {
            return;
        }

        tracing::warn!("Broker link lost, switching to synthetic data");
        producer.stop().await;

        let mut fallback = SyntheticProducer::new(synthetic.clone(), clock.clone());
        match fallback.start(events.clone()).await {
            Ok(()) => {
                *guard = Some(ActiveProducer::Synthetic(fallback));
                tracing::info!(producer = %ProducerKind::Synthetic, "Fallback producer running");
            }
            Err(e) => {
                tracing::error!(error = %e, "Fallback producer failed to start");
                *guard = None;
            }
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::producer::{BrokerConfig, LiveProducer};
    use crate::reading::{compute_index, Measurements, Reading, SensorId};
    use crate::testing::{epoch, manual_clock, RecordingSink};

    fn reading(sensor: &str, pm25: f64) -> Reading {
        Reading::new(
            SensorId::new(sensor),
            Measurements {
                pm25,
                pm10: 12.0,
                co2: 410.0,
                temperature: 19.0,
                humidity: 40.0,
                pressure: None,
            },
            compute_index(pm25),
            "Test",
            epoch(),
        )
    }

    #[tokio::test]
    async fn test_pump_coalesces_burst() {
        let (_, clock) = manual_clock();
        let registry = Arc::new(StateRegistry::new());
        let manager = Arc::new(ConnectionManager::new(clock));
        let counters = Arc::new(PipelineCounters::new());
        let sink = RecordingSink::new();
        manager.accept(sink.clone()).await.unwrap();

        let (tx, rx) = mpsc::channel(16);
        for pm25 in [1.0, 2.0, 3.0, 4.0] {
            registry.upsert(reading("sensor_001", pm25)).await;
            tx.send(Notification::StateChanged(SensorId::new("sensor_001")))
                .await
                .unwrap();
        }
        drop(tx);

        run_broadcast_pump(rx, registry, manager, Arc::clone(&counters)).await;

        assert_eq!(sink.types(), vec!["connection", "sensor_update"]);
        assert_eq!(sink.messages()[1]["data"]["sensor_001"]["pm25"], 4.0);
        assert_eq!(counters.snapshot().state_broadcasts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_ticker_period() {
        let (_, clock) = manual_clock();
        let manager = Arc::new(ConnectionManager::new(clock));
        let counters = Arc::new(PipelineCounters::new());
        let sink = RecordingSink::new();
        manager.accept(sink.clone()).await.unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_probe_ticker(
            Duration::from_secs(30),
            Arc::clone(&manager),
            counters,
            stop_rx,
        ));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(sink.len(), 1);

        tokio::time::sleep(Duration::from_secs(32)).await;
        assert_eq!(sink.types(), vec!["connection", "ping", "ping"]);

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_skips_empty_registry() {
        let (_, clock) = manual_clock();
        let registry = Arc::new(StateRegistry::new());
        let manager = Arc::new(ConnectionManager::new(clock));
        let sink = RecordingSink::new();
        manager.accept(sink.clone()).await.unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_refresh_ticker(
            Duration::from_secs(5),
            Arc::clone(&registry),
            manager,
            Arc::new(PipelineCounters::new()),
            stop_rx,
        ));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.len(), 1);

        registry.upsert(reading("sensor_002", 9.0)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.types(), vec!["connection", "sensor_update"]);

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_falls_back_on_lost_link() {
        let (_, clock) = manual_clock();
        let slot: ProducerSlot = Arc::new(Mutex::new(Some(ActiveProducer::Live(
            LiveProducer::new(BrokerConfig::default(), clock.clone()),
        ))));
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connected);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (events_tx, mut events_rx) = mpsc::channel(16);

        let task = tokio::spawn(supervise_link(
            status_rx,
            Arc::clone(&slot),
            SyntheticConfig::default(),
            clock,
            events_tx,
            stop_rx,
        ));

        status_tx.send_replace(LinkStatus::Disconnected);
        task.await.unwrap();

        let event = events_rx.recv().await.unwrap();
        assert_eq!(event.sensor_id.as_str(), "sensor_001");

        let mut slot = slot.lock().await;
        let producer = slot.as_mut().unwrap();
        assert_eq!(producer.kind(), ProducerKind::Synthetic);
        producer.stop().await;
    }

    #[tokio::test]
    async fn test_supervisor_exits_on_shutdown() {
        let (_, clock) = manual_clock();
        let slot: ProducerSlot = Arc::new(Mutex::new(None));
        let (_status_tx, status_rx) = watch::channel(LinkStatus::Connected);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (events_tx, _events_rx) = mpsc::channel(1);

        let task = tokio::spawn(supervise_link(
            status_rx,
            Arc::clone(&slot),
            SyntheticConfig::default(),
            clock,
            events_tx,
            stop_rx,
        ));

        stop_tx.send(true).unwrap();
        task.await.unwrap();

        assert!(slot.lock().await.is_none());
    }
}
