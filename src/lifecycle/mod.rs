//! Lifecycle controller
//!
//! ```text
//!             Pipeline::start
//!                   │
//!       ┌───────────┼──────────────────────────────┐
//!       ▼           ▼                              ▼
//!   producer ──► ingest worker ──► broadcast pump ──► subscribers
//!   (live or        │                  ▲
//!    synthetic)     ▼                  │
//!               registry ──────────────┘
//!
//!   probe ticker, refresh ticker, link supervisor run alongside
//! ```

pub mod config;
pub mod controller;
pub mod state;
mod tasks;

pub use config::PipelineConfig;
pub use controller::Pipeline;
pub use state::{LifecyclePhase, PhaseCell};
