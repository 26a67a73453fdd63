//! Pipeline lifecycle state machine
//!
//! ```text
//!   Idle ──► Starting ──► Running ──► Stopping ──► Stopped
//!     │          └───────────────────────►│
//!     └──────────────────────────────────►┘
//! ```
//!
//! Transitions only move forward. `Stopped` is terminal.

use serde::Serialize;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Pipeline lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Constructed, nothing started
    Idle,
    /// Selecting and starting a producer
    Starting,
    /// Producer, ingest and broadcast tasks running
    Running,
    /// Tearing down in order
    Stopping,
    /// Torn down; the instance cannot be restarted
    Stopped,
}

impl LifecyclePhase {
    /// Whether `next` directly follows this phase
    pub fn can_transition_to(self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                // Shutdown before start, or a start that could not finish
                | (Idle, Stopping)
                | (Starting, Stopping)
        )
    }

    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        self == LifecyclePhase::Stopped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Starting => "starting",
            LifecyclePhase::Running => "running",
            LifecyclePhase::Stopping => "stopping",
            LifecyclePhase::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase with change notification
#[derive(Debug)]
pub struct PhaseCell {
    tx: watch::Sender<LifecyclePhase>,
}

impl PhaseCell {
    /// Start in `Idle`
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecyclePhase::Idle);
        Self { tx }
    }

    /// Current phase
    pub fn get(&self) -> LifecyclePhase {
        *self.tx.borrow()
    }

    /// Watch phase changes
    pub fn subscribe(&self) -> watch::Receiver<LifecyclePhase> {
        self.tx.subscribe()
    }

    /// Move to `next`, failing if that is not the following phase
    pub fn transition(&self, next: LifecyclePhase) -> Result<()> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                tracing::debug!(from = %current, to = %next, "Lifecycle transition");
                *current = next;
                true
            } else {
                outcome = Err(Error::InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });
        outcome
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}
