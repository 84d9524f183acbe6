//! Order statistics used by the normalizer and aggregator
//!
//! Everything here is total: empty input gives a median of 0 and a flat
//! sample gives a spread of 1, so callers never see NaN or infinity from
//! sparse data.

use serde::{Deserialize, Serialize};

/// Median of the finite values in `values`; 0 when there are none.
///
/// Odd counts return the middle element, even counts the mean of the two
/// middle elements.
pub fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation around `center`, without substitution
pub fn median_absolute_deviation(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| (v - center).abs())
        .collect();
    median(&deviations)
}

/// Robust location and spread of a latency sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobustBaseline {
    pub median: f64,
    /// MAD, replaced by 1 when the data is flat
    pub mad: f64,
}

impl RobustBaseline {
    pub fn from_values(values: &[f64]) -> Self {
        let center = median(values);
        let mad = median_absolute_deviation(values, center);
        RobustBaseline {
            median: center,
            mad: if mad == 0.0 { 1.0 } else { mad },
        }
    }

    /// `(value - median) / mad`
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.median) / self.mad
    }
}
