//! Sensor readings
//!
//! A [`Reading`] is the canonical record the pipeline moves around: one
//! sensor's measurements, the derived air-quality index, a location label and
//! the arrival timestamp.

pub mod aqi;
pub mod record;

pub use aqi::{compute_index, AqiCategory, MAX_INDEX};
pub use record::{Measurements, Reading, SensorId, SensorStatus};
