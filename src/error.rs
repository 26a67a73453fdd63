//! Crate-wide error type

use crate::broadcast::BroadcastError;
use crate::lifecycle::LifecyclePhase;

/// Error type for pipeline operations
#[derive(Debug)]
pub enum Error {
    /// Socket or file I/O failure
    Io(std::io::Error),
    /// JSON encoding or decoding failure
    Json(serde_json::Error),
    /// Invalid or unreadable configuration
    Config(String),
    /// Broker connection or protocol failure
    Broker(String),
    /// Operation needs a live broker link that is not up
    NotConnected,
    /// Producer was started twice
    AlreadyRunning,
    /// Pipeline is stopping or stopped
    ShuttingDown,
    /// Lifecycle transition not allowed from the current phase
    InvalidTransition {
        from: LifecyclePhase,
        to: LifecyclePhase,
    },
    /// Subscriber registration or delivery failure
    Broadcast(BroadcastError),
    /// Persistence collaborator failure
    Store(String),
}

/// Result alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Broker(msg) => write!(f, "Broker error: {}", msg),
            Error::NotConnected => write!(f, "Broker not connected"),
            Error::AlreadyRunning => write!(f, "Producer already running"),
            Error::ShuttingDown => write!(f, "Pipeline is shutting down"),
            Error::InvalidTransition { from, to } => {
                write!(f, "Invalid lifecycle transition: {} -> {}", from, to)
            }
            Error::Broadcast(e) => write!(f, "Broadcast error: {}", e),
            Error::Store(msg) => write!(f, "Store error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Broadcast(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<BroadcastError> for Error {
    fn from(e: BroadcastError) -> Self {
        Error::Broadcast(e)
    }
}
