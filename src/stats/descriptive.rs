//! Descriptive statistics
//!
//! Sample standard deviation uses `ddof = 1`; quantiles use linear
//! interpolation between order statistics (numpy's default).

use crate::{Error, Result};
use serde::Serialize;

/// Arithmetic mean; NaN for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    values.iter().sum::<f64>() / n
}

/// Sample variance (`ddof = 1`); NaN below two observations.
#[must_use]
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    #[allow(clippy::cast_precision_loss)]
    let dof = (values.len() - 1) as f64;
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / dof
}

/// Sample standard deviation (`ddof = 1`)
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Sorted copy (NaN sorts last)
#[must_use]
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// Quantile `q ∈ [0, 1]` of already-sorted data, linear interpolation.
#[must_use]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    #[allow(clippy::cast_precision_loss)]
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    #[allow(clippy::cast_precision_loss)]
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Median
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    quantile_sorted(&sorted(values), 0.5)
}

/// Five-number summary plus mean and standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    /// Number of observations
    pub count: usize,
    /// Mean
    pub mean: f64,
    /// Sample standard deviation (NaN for a single observation)
    pub std: f64,
    /// Minimum
    pub min: f64,
    /// First quartile
    pub q1: f64,
    /// Median
    pub median: f64,
    /// Third quartile
    pub q3: f64,
    /// Maximum
    pub max: f64,
}

impl Summary {
    /// Summarize a sample.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` for an empty sample.
    pub fn of(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::InsufficientData {
                what: "summary statistics".to_string(),
                needed: 1,
                got: 0,
            });
        }
        let s = sorted(values);
        Ok(Self {
            count: values.len(),
            mean: mean(values),
            std: std_dev(values),
            min: s[0],
            q1: quantile_sorted(&s, 0.25),
            median: quantile_sorted(&s, 0.5),
            q3: quantile_sorted(&s, 0.75),
            max: s[s.len() - 1],
        })
    }

    /// Interquartile range
    #[must_use]
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}
