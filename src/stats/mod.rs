//! Health counts

pub mod metrics;

pub use metrics::{CounterSnapshot, PipelineCounters, PipelineStats};
