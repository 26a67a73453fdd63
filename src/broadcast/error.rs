//! Broadcast error types

use super::connection::ConnectionId;

/// Failure delivering one frame to one subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    /// Peer already closed the channel
    Closed,
    /// Write did not complete within the write timeout
    TimedOut,
    /// Transport failure
    Io(String),
    /// Frame could not be represented on the transport
    Encoding(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Closed => write!(f, "Subscriber channel closed"),
            SinkError::TimedOut => write!(f, "Subscriber write timed out"),
            SinkError::Io(msg) => write!(f, "Subscriber I/O error: {}", msg),
            SinkError::Encoding(msg) => write!(f, "Frame encoding error: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

/// Errors from the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastError {
    /// Push message could not be serialized
    Encode(String),
    /// Welcome message could not be delivered; nothing was registered
    WelcomeFailed {
        connection: ConnectionId,
        reason: SinkError,
    },
    /// Push to a single subscriber failed; the subscriber was removed
    Delivery {
        connection: ConnectionId,
        reason: SinkError,
    },
    /// Connection is not registered
    UnknownConnection(ConnectionId),
    /// Manager was closed; no subscriber can be registered
    Closed,
}

impl std::fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcastError::Encode(msg) => write!(f, "Failed to encode push message: {}", msg),
            BroadcastError::WelcomeFailed { connection, reason } => {
                write!(f, "Welcome to {} failed: {}", connection, reason)
            }
            BroadcastError::Delivery { connection, reason } => {
                write!(f, "Push to {} failed: {}", connection, reason)
            }
            BroadcastError::UnknownConnection(id) => write!(f, "Unknown connection: {}", id),
            BroadcastError::Closed => write!(f, "Connection manager closed"),
        }
    }
}

impl std::error::Error for BroadcastError {}

impl From<serde_json::Error> for BroadcastError {
    fn from(e: serde_json::Error) -> Self {
        BroadcastError::Encode(e.to_string())
    }
}
