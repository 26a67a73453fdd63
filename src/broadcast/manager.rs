//! Connection manager
//!
//! Owns the set of live subscribers. Structural changes (accept, remove)
//! take the write lock briefly; deliveries work on a copy of the connection
//! list taken under the read lock, so a slow subscriber never holds the set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;

use super::connection::{ConnectionId, Subscriber, SubscriberInfo};
use super::error::{BroadcastError, SinkError};
use super::message::{PushFrame, PushMessage};
use super::sink::SubscriberSink;
use crate::clock::SharedClock;
use crate::ingest::Alert;
use crate::registry::RegistrySnapshot;

/// Default welcome text
pub const DEFAULT_WELCOME: &str = "Connected to AirSense real-time data stream";

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers the frame was addressed to
    pub attempted: usize,
    /// Subscribers that accepted the frame
    pub delivered: usize,
    /// Subscribers removed because the write failed
    pub failed: usize,
}

/// Registry of live subscribers and fan-out of push messages
pub struct ConnectionManager<S: SubscriberSink> {
    connections: RwLock<HashMap<ConnectionId, Arc<Subscriber<S>>>>,
    /// Set by `close_all` under the `connections` write lock
    closed: AtomicBool,
    next_id: AtomicU64,
    clock: SharedClock,
    welcome: String,
}

impl<S: SubscriberSink> ConnectionManager<S> {
    /// Create an empty manager
    pub fn new(clock: SharedClock) -> Self {
        Self::with_welcome(clock, DEFAULT_WELCOME)
    }

    /// Create an empty manager with a custom welcome text
    pub fn with_welcome(clock: SharedClock, welcome: impl Into<String>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            clock,
            welcome: welcome.into(),
        }
    }

    /// Register a subscriber and send its welcome message
    ///
    /// The welcome is written before the subscriber joins the set, so it is
    /// always the first frame the subscriber sees. If the write fails, or
    /// [`close_all`](Self::close_all) ran meanwhile, the sink is closed and
    /// nothing is registered.
    pub async fn accept(&self, sink: S) -> Result<Arc<Subscriber<S>>, BroadcastError> {
        if self.is_closed() {
            sink.close().await;
            return Err(BroadcastError::Closed);
        }

        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Arc::new(Subscriber::new(id, sink, self.clock.now()));

        let welcome = PushMessage::Connection {
            message: &self.welcome,
            connection_id: subscriber.identity(),
        }
        .encode()?;

        if let Err(reason) = subscriber.sink().send(welcome).await {
            tracing::warn!(connection = %id, error = %reason, "Welcome failed, subscriber not registered");
            subscriber.sink().close().await;
            return Err(BroadcastError::WelcomeFailed {
                connection: id,
                reason,
            });
        }
        subscriber.touch(self.clock.now());

        let total = {
            let mut connections = self.connections.write().await;
            if self.closed.load(Ordering::Acquire) {
                None
            } else {
                connections.insert(id, Arc::clone(&subscriber));
                Some(connections.len())
            }
        };
        let Some(total) = total else {
            tracing::debug!(connection = %id, "Manager closed during welcome, subscriber not registered");
            subscriber.sink().close().await;
            return Err(BroadcastError::Closed);
        };

        tracing::info!(
            connection = %id,
            identity = %subscriber.identity(),
            total = total,
            "Subscriber connected"
        );

        Ok(subscriber)
    }

    /// Unregister a subscriber and close its sink
    ///
    /// Returns false if it was not registered; removing twice is a no-op.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let (removed, total) = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(&id);
            (removed, connections.len())
        };

        match removed {
            Some(subscriber) => {
                subscriber.sink().close().await;
                tracing::info!(connection = %id, total = total, "Subscriber disconnected");
                true
            }
            None => false,
        }
    }

    /// Push one frame to one subscriber
    ///
    /// A failed write removes the subscriber.
    pub async fn push_to_one(&self, id: ConnectionId, frame: PushFrame) -> Result<(), BroadcastError> {
        let subscriber = self
            .connections
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(BroadcastError::UnknownConnection(id))?;

        match subscriber.sink().send(frame).await {
            Ok(()) => {
                subscriber.touch(self.clock.now());
                Ok(())
            }
            Err(reason) => {
                tracing::warn!(connection = %id, error = %reason, "Push failed, dropping subscriber");
                self.remove(id).await;
                Err(BroadcastError::Delivery {
                    connection: id,
                    reason,
                })
            }
        }
    }

    /// Push one frame to every registered subscriber
    ///
    /// Writes run concurrently. Subscribers whose write fails are removed
    /// after every write has finished; one failure never stops delivery to
    /// the others.
    pub async fn broadcast(&self, frame: &PushFrame) -> DeliveryReport {
        let targets: Vec<Arc<Subscriber<S>>> =
            self.connections.read().await.values().cloned().collect();

        if targets.is_empty() {
            return DeliveryReport::default();
        }

        let results: Vec<Result<(), SinkError>> = join_all(
            targets
                .iter()
                .map(|subscriber| subscriber.sink().send(frame.clone())),
        )
        .await;

        let now = self.clock.now();
        let mut report = DeliveryReport {
            attempted: targets.len(),
            ..DeliveryReport::default()
        };
        let mut failed = Vec::new();

        for (subscriber, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => {
                    subscriber.touch(now);
                    report.delivered += 1;
                }
                Err(reason) => {
                    tracing::warn!(
                        connection = %subscriber.id(),
                        kind = %frame.kind(),
                        error = %reason,
                        "Push failed, dropping subscriber"
                    );
                    failed.push(subscriber.id());
                }
            }
        }

        for id in failed {
            if self.remove(id).await {
                report.failed += 1;
            }
        }

        tracing::debug!(
            kind = %frame.kind(),
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );

        report
    }

    /// Encode and broadcast a message
    pub async fn broadcast_message(&self, message: &PushMessage<'_>) -> Result<DeliveryReport, BroadcastError> {
        let frame = message.encode()?;
        Ok(self.broadcast(&frame).await)
    }

    /// Broadcast a full registry snapshot as a `sensor_update`
    pub async fn broadcast_state(&self, snapshot: &RegistrySnapshot) -> Result<DeliveryReport, BroadcastError> {
        self.broadcast_message(&PushMessage::SensorUpdate {
            timestamp: self.clock.now(),
            data: snapshot,
        })
        .await
    }

    /// Broadcast an alert
    pub async fn broadcast_alert(&self, alert: &Alert) -> Result<DeliveryReport, BroadcastError> {
        self.broadcast_message(&PushMessage::Alert {
            timestamp: self.clock.now(),
            alert,
        })
        .await
    }

    /// Send a keep-alive to every subscriber, dropping the ones that fail
    pub async fn probe_liveness(&self) -> Result<DeliveryReport, BroadcastError> {
        self.broadcast_message(&PushMessage::Ping {
            timestamp: self.clock.now(),
        })
        .await
    }

    /// Remove and close every subscriber
    ///
    /// The manager accepts no subscribers afterwards. Returns how many were
    /// closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Subscriber<S>>> = {
            let mut connections = self.connections.write().await;
            self.closed.store(true, Ordering::Release);
            connections.drain().map(|(_, subscriber)| subscriber).collect()
        };

        join_all(drained.iter().map(|subscriber| subscriber.sink().close())).await;

        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Closed all subscribers");
        }
        drained.len()
    }

    /// Whether `close_all` has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of registered subscribers
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether a subscriber is registered
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Details of every registered subscriber, oldest first
    pub async fn connections(&self) -> Vec<SubscriberInfo> {
        let mut subscribers: Vec<Arc<Subscriber<S>>> =
            self.connections.read().await.values().cloned().collect();
        subscribers.sort_by_key(|subscriber| subscriber.id());
        subscribers.iter().map(|subscriber| subscriber.info()).collect()
    }
}
