//! Air-quality index calculator
//!
//! Maps a PM2.5 concentration (µg/m³) to an advisory index in `[0, 500]`.
//!
//! The bands keep their published thresholds and per-band formulas. Adjacent
//! bands do not meet at their shared boundary: band two's formula starts at
//! 12.1 while band one ends at 12.0, so a concentration such as 12.05 would
//! evaluate to 49 under band two. Such inputs are clamped up to the band's
//! floor index, which keeps the index non-decreasing in the concentration.

use serde::{Deserialize, Serialize};

/// Highest index the calculator reports
pub const MAX_INDEX: u16 = 500;

/// One concentration band
#[derive(Debug, Clone, Copy)]
struct Band {
    /// Inclusive upper concentration bound
    upper: f64,
    /// Index at the band's formula origin
    base: f64,
    /// Concentration at which the formula yields `base`
    origin: f64,
    /// Concentration span the formula is normalised over
    width: f64,
    /// Index span covered across `width`
    scale: f64,
}

impl Band {
    fn evaluate(&self, concentration: f64) -> f64 {
        self.base + ((concentration - self.origin) / self.width) * self.scale
    }
}

const BANDS: [Band; 4] = [
    Band { upper: 12.0, base: 0.0, origin: 0.0, width: 12.0, scale: 50.0 },
    Band { upper: 35.4, base: 50.0, origin: 12.1, width: 23.3, scale: 50.0 },
    Band { upper: 55.4, base: 100.0, origin: 35.5, width: 19.9, scale: 50.0 },
    Band { upper: f64::INFINITY, base: 150.0, origin: 55.5, width: 94.9, scale: 100.0 },
];

fn band_for(concentration: f64) -> &'static Band {
    BANDS
        .iter()
        .find(|band| concentration <= band.upper)
        .unwrap_or(&BANDS[BANDS.len() - 1])
}

/// Unclamped band formula for `concentration`
pub(crate) fn band_formula(concentration: f64) -> f64 {
    band_for(concentration).evaluate(concentration)
}

/// Compute the index for a PM2.5 concentration
///
/// Total and deterministic: negative or NaN input yields 0, anything past
/// the top of the scale yields [`MAX_INDEX`].
pub fn compute_index(pm25: f64) -> u16 {
    if pm25.is_nan() {
        return 0;
    }

    let concentration = pm25.max(0.0);
    let band = band_for(concentration);
    let value = band.evaluate(concentration).max(band.base);

    // Truncate toward zero; the saturating cast maps +inf to u16::MAX.
    let index = value as u16;
    index.min(MAX_INDEX)
}

/// Health category for an index value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    /// Category for an index value
    pub fn from_index(index: u16) -> Self {
        match index {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl std::fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
