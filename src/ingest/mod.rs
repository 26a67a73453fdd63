//! Ingestion stage
//!
//! ```text
//!   mpsc<RawEvent> ──► IngestWorker
//!                        │ Normalizer::normalize
//!                        ├──► StateRegistry::upsert
//!                        ├──► persistence queue (try_send, may drop)
//!                        ├──► AlertTracker::evaluate
//!                        └──► mpsc<Notification> ──► broadcast pump
//! ```

pub mod alert;
pub mod error;
pub mod normalizer;
pub mod worker;

pub use alert::{Alert, AlertKind, AlertSeverity, AlertThresholds, AlertTracker};
pub use error::IngestError;
pub use normalizer::{
    category_fields, Normalized, Normalizer, StatusUpdate, REQUIRED_FIELDS, UNKNOWN_LOCATION,
};
pub use worker::{IngestWorker, Notification};
