//! Test doubles shared across modules

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::broadcast::{PushFrame, SinkError, SubscriberSink};
use crate::clock::{ManualClock, SharedClock};

const MODE_OK: u8 = 0;
const MODE_FAIL: u8 = 1;
const MODE_STALL: u8 = 2;
const MODE_HOLD: u8 = 3;

#[derive(Default)]
struct Inner {
    frames: Mutex<Vec<PushFrame>>,
    mode: AtomicU8,
    closed: AtomicBool,
    held: AtomicBool,
    notify: Notify,
    gate: Notify,
}

/// Sink that records every frame it accepts
///
/// Clones share state, so a test keeps one clone to inspect while the
/// manager owns the other.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    inner: Arc<Inner>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose first write already fails
    pub fn failing() -> Self {
        let sink = Self::new();
        sink.fail();
        sink
    }

    /// Make every following write fail
    pub fn fail(&self) {
        self.inner.mode.store(MODE_FAIL, Ordering::SeqCst);
    }

    /// Make every following write hang forever
    pub fn stall(&self) {
        self.inner.mode.store(MODE_STALL, Ordering::SeqCst);
    }

    /// Park the next write until [`release`](Self::release)
    pub fn hold(&self) {
        self.inner.mode.store(MODE_HOLD, Ordering::SeqCst);
    }

    /// Let parked writes complete
    pub fn release(&self) {
        self.inner.mode.store(MODE_OK, Ordering::SeqCst);
        self.inner.gate.notify_waiters();
    }

    /// Wait until a write is parked by [`hold`](Self::hold)
    pub async fn wait_held(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.held.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    pub fn frames(&self) -> Vec<PushFrame> {
        self.inner.frames.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.frames.lock().unwrap().len()
    }

    /// Decoded JSON bodies
    pub fn messages(&self) -> Vec<Value> {
        self.frames()
            .iter()
            .map(|frame| serde_json::from_slice(frame.payload()).unwrap())
            .collect()
    }

    /// `type` tags of received messages, in order
    pub fn types(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| m["type"].as_str().unwrap().to_string())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` frames were recorded
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.inner.notify.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Wait for the first frame of the given type and return it
    pub async fn wait_for_type(&self, kind: &str) -> Value {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(found) = self
                .messages()
                .into_iter()
                .find(|m| m["type"].as_str() == Some(kind))
            {
                return found;
            }
            notified.await;
        }
    }
}

impl SubscriberSink for RecordingSink {
    async fn send(&self, frame: PushFrame) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        match self.inner.mode.load(Ordering::SeqCst) {
            MODE_FAIL => return Err(SinkError::Io("connection reset".to_string())),
            MODE_STALL => std::future::pending::<()>().await,
            _ => {}
        }
        loop {
            let released = self.inner.gate.notified();
            if self.inner.mode.load(Ordering::SeqCst) != MODE_HOLD {
                break;
            }
            self.inner.held.store(true, Ordering::SeqCst);
            self.inner.notify.notify_waiters();
            released.await;
        }
        self.inner.frames.lock().unwrap().push(frame);
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }
}

/// Fixed instant used by tests
pub(crate) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Manual clock at [`epoch`]
pub(crate) fn manual_clock() -> (ManualClock, SharedClock) {
    let clock = ManualClock::new(epoch());
    let shared: SharedClock = Arc::new(clock.clone());
    (clock, shared)
}
