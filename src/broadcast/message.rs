//! Push message envelopes
//!
//! Every frame a subscriber receives is one JSON object tagged by `type`:
//!
//! ```text
//! {"type":"connection","message":"...","connection_id":"conn_1_1700000000000"}
//! {"type":"sensor_update","timestamp":"...","data":{"sensor_001":{...}}}
//! {"type":"ping","timestamp":"..."}
//! {"type":"alert","timestamp":"...","alert":{...}}
//! ```

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::BroadcastError;
use crate::ingest::Alert;
use crate::registry::RegistrySnapshot;

/// Message pushed to subscribers
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage<'a> {
    /// One-time welcome carrying the assigned identity
    Connection {
        message: &'a str,
        connection_id: &'a str,
    },
    /// Full registry snapshot
    SensorUpdate {
        timestamp: DateTime<Utc>,
        data: &'a RegistrySnapshot,
    },
    /// Keep-alive probe
    Ping { timestamp: DateTime<Utc> },
    /// Threshold alert
    Alert {
        timestamp: DateTime<Utc>,
        alert: &'a Alert,
    },
}

impl PushMessage<'_> {
    /// Envelope type tag
    pub fn kind(&self) -> FrameKind {
        match self {
            PushMessage::Connection { .. } => FrameKind::Connection,
            PushMessage::SensorUpdate { .. } => FrameKind::SensorUpdate,
            PushMessage::Ping { .. } => FrameKind::Ping,
            PushMessage::Alert { .. } => FrameKind::Alert,
        }
    }

    /// Serialize once into a frame that can be sent to any number of subscribers
    pub fn encode(&self) -> Result<PushFrame, BroadcastError> {
        let payload = serde_json::to_vec(self)?;
        Ok(PushFrame {
            kind: self.kind(),
            payload: Bytes::from(payload),
        })
    }
}

/// Envelope type of an encoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Connection,
    SensorUpdate,
    Ping,
    Alert,
}

impl FrameKind {
    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Connection => "connection",
            FrameKind::SensorUpdate => "sensor_update",
            FrameKind::Ping => "ping",
            FrameKind::Alert => "alert",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded push message
///
/// Cloning shares the payload buffer, so one encoded broadcast is handed to
/// every subscriber without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct PushFrame {
    kind: FrameKind,
    payload: Bytes,
}

impl PushFrame {
    /// Envelope type
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// UTF-8 JSON body
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Take the JSON body
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Body as text
    pub fn as_str(&self) -> &str {
        // Payloads only come from serde_json, which always emits UTF-8.
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }
}
