//! Subscriber connection records

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Handle for one registered subscriber
///
/// Allocated from a process-wide counter, so a handle is never reused while
/// the manager lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw counter value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One live subscriber
pub struct Subscriber<S> {
    id: ConnectionId,
    identity: String,
    connected_at: DateTime<Utc>,
    /// Unix millis of the last successful push or probe
    last_activity_ms: AtomicI64,
    sink: S,
}

impl<S> Subscriber<S> {
    pub(crate) fn new(id: ConnectionId, sink: S, connected_at: DateTime<Utc>) -> Self {
        Self {
            id,
            identity: format!("conn_{}_{}", id.get(), connected_at.timestamp_millis()),
            connected_at,
            last_activity_ms: AtomicI64::new(connected_at.timestamp_millis()),
            sink,
        }
    }

    /// Manager handle
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Identity string announced in the welcome message
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// When the subscriber was accepted
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Last successful push or probe
    pub fn last_activity(&self) -> DateTime<Utc> {
        let millis = self.last_activity_ms.load(Ordering::Relaxed);
        DateTime::from_timestamp_millis(millis).unwrap_or(self.connected_at)
    }

    /// Record a successful delivery
    pub(crate) fn touch(&self, now: DateTime<Utc>) {
        self.last_activity_ms
            .fetch_max(now.timestamp_millis(), Ordering::Relaxed);
    }

    /// Transport half
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Serializable summary
    pub fn info(&self) -> SubscriberInfo {
        SubscriberInfo {
            id: self.identity.clone(),
            connected_at: self.connected_at,
            last_activity: self.last_activity(),
        }
    }
}

impl<S> std::fmt::Debug for Subscriber<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Connection details reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriberInfo {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
