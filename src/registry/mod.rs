//! Latest-state registry
//!
//! The registry keeps the newest reading for every sensor. The ingest worker
//! is its only writer; the broadcast pump and external read-only callers take
//! snapshots.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<StateRegistry>
//!                  ┌──────────────────────────┐
//!                  │ readings: HashMap<       │
//!                  │   SensorId,              │
//!                  │   Arc<Reading>           │
//!                  │ >                        │
//!                  └────────────┬─────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!   [ingest worker]      [broadcast pump]       [API reads]
//!   upsert(reading)      snapshot()             snapshot() / get()
//! ```
//!
//! # Sharing
//!
//! Entries are `Arc<Reading>`, so a snapshot copies the map's pointers and
//! never the measurement data. Readings are immutable; an upsert swaps the
//! pointer.

pub mod snapshot;
pub mod store;

pub use snapshot::RegistrySnapshot;
pub use store::StateRegistry;
