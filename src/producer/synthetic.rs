//! Synthetic telemetry generator
//!
//! Sweeps a fixed roster of sensors at a fixed cadence and emits a full
//! air-quality record for each. Values are a deterministic function of the
//! clock and the sensor id: each measurement blends two sine waves with a
//! per-sensor phase, so consecutive samples drift smoothly inside a bounded
//! range instead of jumping around like noise.

use std::f64::consts::TAU;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::config::SyntheticConfig;
use super::event::RawEvent;
use super::roster::SensorSpec;
use super::topic::{SensorCategory, TopicScheme};
use super::{EventSender, ProducerKind, TelemetryProducer};
use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::reading::SensorId;

/// Bounded range a measurement oscillates within
#[derive(Debug, Clone, Copy)]
struct Profile {
    floor: f64,
    span: f64,
    /// Period of the dominant wave, in seconds
    period: f64,
}

impl Profile {
    fn sample(&self, t: f64, phase: f64) -> f64 {
        let blend = 0.8 * wave(t, self.period, phase) + 0.2 * wave(t, self.period / 7.3, phase * 1.9 + 0.25);
        self.floor + self.span * blend
    }

    #[cfg(test)]
    fn ceiling(&self) -> f64 {
        self.floor + self.span
    }
}

const PM25: Profile = Profile { floor: 8.0, span: 27.0, period: 300.0 };
const CO2: Profile = Profile { floor: 420.0, span: 180.0, period: 900.0 };
const TEMPERATURE: Profile = Profile { floor: 17.0, span: 9.0, period: 3600.0 };
const HUMIDITY: Profile = Profile { floor: 40.0, span: 40.0, period: 1800.0 };
const PRESSURE: Profile = Profile { floor: 1003.0, span: 30.0, period: 7200.0 };

/// PM10 tracks PM2.5 at this ratio plus a small independent swing
const PM10_RATIO: f64 = 1.7;
const PM10_SWING: f64 = 5.0;

/// Value in `[0, 1]`
fn wave(t: f64, period: f64, phase: f64) -> f64 {
    0.5 + 0.5 * (TAU * (t / period + phase)).sin()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Stable per-sensor phase in `[0, 1)`
fn sensor_phase(id: &SensorId) -> f64 {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in id.as_str().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % 100) as f64 / 100.0
}

/// Build one synthetic air-quality event for `sensor` at `now`
pub fn synthesize(sensor: &SensorSpec, topics: &TopicScheme, now: DateTime<Utc>) -> RawEvent {
    let t = now.timestamp_millis() as f64 / 1000.0;
    let phase = sensor_phase(&sensor.id);

    let pm25 = round1(PM25.sample(t, phase));
    let pm10 = round1(pm25 * PM10_RATIO + PM10_SWING * wave(t, 45.0, phase));

    let payload: Map<String, Value> = [
        ("location", Value::from(sensor.location.clone())),
        ("latitude", Value::from(sensor.latitude)),
        ("longitude", Value::from(sensor.longitude)),
        ("pm25", Value::from(pm25)),
        ("pm10", Value::from(pm10)),
        ("co2", Value::from(CO2.sample(t, phase).round())),
        ("temperature", Value::from(round1(TEMPERATURE.sample(t, phase)))),
        ("humidity", Value::from(round1(HUMIDITY.sample(t, phase)))),
        ("pressure", Value::from(round1(PRESSURE.sample(t, phase)))),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect();

    RawEvent {
        sensor_id: sensor.id.clone(),
        category: SensorCategory::AirQuality,
        topic: topics.data_topic(&sensor.id, SensorCategory::AirQuality),
        received_at: now,
        payload,
    }
}

/// Producer that fabricates plausible readings for a fixed roster
pub struct SyntheticProducer {
    config: SyntheticConfig,
    clock: SharedClock,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SyntheticProducer {
    /// Create a stopped generator
    pub fn new(config: SyntheticConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            stop_tx: None,
            task: None,
        }
    }

    /// Sensors this generator sweeps
    pub fn roster(&self) -> &[SensorSpec] {
        &self.config.roster
    }
}

impl TelemetryProducer for SyntheticProducer {
    async fn start(&mut self, events: EventSender) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = Sweeper {
            roster: self.config.roster.clone(),
            topics: self.config.topics(),
            clock: self.clock.clone(),
            pacing: self.config.sensor_pacing,
            sweep_interval: self.config.sweep_interval,
            events,
            stop: stop_rx,
        };

        self.task = Some(tokio::spawn(sweeper.run()));
        self.stop_tx = Some(stop_tx);

        tracing::info!(
            sensors = self.config.roster.len(),
            sweep_interval_ms = self.config.sweep_interval.as_millis() as u64,
            "Synthetic producer started"
        );
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Synthetic producer task ended abnormally");
            }
            tracing::info!("Synthetic producer stopped");
        }
    }

    fn kind(&self) -> ProducerKind {
        ProducerKind::Synthetic
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// State owned by the background sweep task
struct Sweeper {
    roster: Vec<SensorSpec>,
    topics: TopicScheme,
    clock: SharedClock,
    pacing: Duration,
    sweep_interval: Duration,
    events: EventSender,
    stop: watch::Receiver<bool>,
}

impl Sweeper {
    async fn run(self) {
        let Sweeper {
            roster,
            topics,
            clock,
            pacing,
            sweep_interval,
            events,
            mut stop,
        } = self;

        let mut sweeps: u64 = 0;
        loop {
            for sensor in &roster {
                let event = synthesize(sensor, &topics, clock.now());
                if events.send(event).await.is_err() {
                    tracing::debug!("Event receiver dropped, synthetic producer exiting");
                    return;
                }
                // The current sensor is always emitted before the stop flag is seen.
                if pause(&mut stop, pacing).await {
                    return;
                }
            }

            sweeps += 1;
            tracing::trace!(sweeps = sweeps, "Synthetic sweep complete");

            if pause(&mut stop, sweep_interval).await {
                return;
            }
        }
    }
}

/// Sleep for `duration`; returns true if a stop was requested meanwhile
async fn pause(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop.borrow() {
        return true;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => *stop.borrow(),
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::clock::ManualClock;
    use crate::producer::roster::default_roster;
    use std::sync::Arc;

    fn producer() -> SyntheticProducer {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        SyntheticProducer::new(SyntheticConfig::default(), Arc::new(clock))
    }

    fn within(value: f64, profile: Profile) -> bool {
        value >= profile.floor - 1e-9 && value <= profile.ceiling() + 1e-9
    }

    #[test]
    fn test_values_are_bounded() {
        let topics = TopicScheme::default();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        for sensor in default_roster() {
            for step in 0..2_000 {
                let now = start + chrono::Duration::seconds(step * 37);
                let event = synthesize(&sensor, &topics, now);

                let pm25 = event.number("pm25").unwrap();
                assert!(within(pm25, PM25), "pm25 {} out of range", pm25);
                assert!(within(event.number("co2").unwrap(), CO2));
                assert!(within(event.number("temperature").unwrap(), TEMPERATURE));
                assert!(within(event.number("humidity").unwrap(), HUMIDITY));
                assert!(within(event.number("pressure").unwrap(), PRESSURE));

                let pm10 = event.number("pm10").unwrap();
                assert!(pm10 >= pm25 * PM10_RATIO - 0.1);
                assert!(pm10 <= pm25 * PM10_RATIO + PM10_SWING + 0.1);
            }
        }
    }

    #[test]
    fn test_values_are_deterministic() {
        let topics = TopicScheme::default();
        let sensor = &default_roster()[0];
        let now = Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap();

        assert_eq!(synthesize(sensor, &topics, now), synthesize(sensor, &topics, now));
    }

    #[test]
    fn test_values_vary_smoothly() {
        let topics = TopicScheme::default();
        let sensor = &default_roster()[1];
        let start = Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap();

        let mut previous = synthesize(sensor, &topics, start).number("pm25").unwrap();
        let mut changed = false;
        for step in 1..60 {
            let now = start + chrono::Duration::seconds(step);
            let pm25 = synthesize(sensor, &topics, now).number("pm25").unwrap();
            // A one-second step never moves more than a small fraction of the range.
            assert!((pm25 - previous).abs() < 2.0);
            changed |= pm25 != previous;
            previous = pm25;
        }
        assert!(changed);
    }

    #[test]
    fn test_event_shape() {
        let topics = TopicScheme::default();
        let sensor = &default_roster()[2];
        let now = Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap();

        let event = synthesize(sensor, &topics, now);

        assert_eq!(event.sensor_id.as_str(), "sensor_003");
        assert_eq!(event.category, SensorCategory::AirQuality);
        assert_eq!(event.topic, "airsense/sensors/sensor_003/air_quality");
        assert_eq!(event.received_at, now);
        assert_eq!(event.text("location"), Some("Industrial Zone"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_sweep_emits_each_sensor() {
        let mut producer = producer();
        let (tx, mut rx) = mpsc::channel(16);

        assert_ok!(producer.start(tx).await);
        assert!(producer.is_running());

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(rx.recv().await.unwrap().sensor_id);
        }

        let expected: Vec<_> = default_roster().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, expected);

        producer.stop().await;
        assert!(!producer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_begins_at_roster_start() {
        let mut producer = producer();
        let (tx, mut rx) = mpsc::channel(16);

        producer.start(tx.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().sensor_id.as_str(), "sensor_001");
        assert_eq!(rx.recv().await.unwrap().sensor_id.as_str(), "sensor_002");

        producer.stop().await;
        assert!(rx.try_recv().is_err());

        producer.start(tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().sensor_id.as_str(), "sensor_001");

        producer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let mut producer = producer();
        let (tx, _rx) = mpsc::channel(16);

        producer.start(tx.clone()).await.unwrap();
        let second = producer.start(tx).await;
        assert_err!(&second);
        assert!(matches!(second, Err(Error::AlreadyRunning)));

        producer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_receiver_dropped() {
        let mut producer = producer();
        let (tx, mut rx) = mpsc::channel(16);

        producer.start(tx).await.unwrap();
        rx.recv().await.unwrap();
        drop(rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!producer.is_running());
        producer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_cadence() {
        let mut producer = producer();
        let (tx, mut rx) = mpsc::channel(16);
        let started = tokio::time::Instant::now();

        producer.start(tx).await.unwrap();
        for _ in 0..4 {
            rx.recv().await.unwrap();
        }

        // Three paced sensors plus one sweep interval before the next sweep.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(11_500));
        assert!(elapsed < Duration::from_millis(12_000));

        producer.stop().await;
    }
}
