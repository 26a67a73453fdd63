//! Subscriber registry and fan-out
//!
//! ```text
//!                 ConnectionManager<S>
//!   accept(sink) ──► welcome ──► connections.insert
//!
//!   broadcast(frame)
//!     1. copy connection list   (read lock)
//!     2. send to all, concurrently (no lock)
//!     3. remove failed ones     (write lock, per id)
//! ```
//!
//! The transport is abstracted by [`SubscriberSink`]; the WebSocket server
//! supplies one implementation, tests another.

pub mod connection;
pub mod error;
pub mod manager;
pub mod message;
pub mod sink;

pub use connection::{ConnectionId, Subscriber, SubscriberInfo};
pub use error::{BroadcastError, SinkError};
pub use manager::{ConnectionManager, DeliveryReport, DEFAULT_WELCOME};
pub use message::{FrameKind, PushFrame, PushMessage};
pub use sink::SubscriberSink;
