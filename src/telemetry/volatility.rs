//! Volatility proxy σ
//!
//! An ad hoc instability score: it grows with combined acceleration and
//! with throttle away from the 65% cruise point. There is no match history
//! and no rating update here; the Glicko reference lives in
//! [`crate::glicko`].

use super::{Channel, SetupModifiers};

/// Floor of σ before load terms
pub const BASE: f64 = 0.05;

/// Weight of combined `|lat| + |lon|` load
pub const K_COMBINED: f64 = 0.15;

/// Weight of throttle distance from [`THROTTLE_PIVOT`]
pub const K_THROTTLE: f64 = 0.1;

/// Throttle position with no throttle penalty
pub const THROTTLE_PIVOT: f64 = 0.65;

/// Standard deviation of the additive noise
pub const NOISE_STD: f64 = 0.002;

/// σ before the setup multiplier and clipping.
#[must_use]
pub fn raw_sigma(lat_g: f64, lon_g: f64, throttle: f64, noise: f64) -> f64 {
    BASE + K_COMBINED * (lat_g.abs() + lon_g.abs())
        + K_THROTTLE * (throttle - THROTTLE_PIVOT).abs()
        + noise
}

/// Final σ for one sample of a setup.
#[must_use]
pub fn sigma(lat_g: f64, lon_g: f64, throttle: f64, noise: f64, modifiers: &SetupModifiers) -> f64 {
    Channel::Volatility.clip(raw_sigma(lat_g, lon_g, throttle, noise) * modifiers.sigma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_sigma_at_rest() {
        let s = raw_sigma(0.0, 0.0, THROTTLE_PIVOT, 0.0);
        assert!((s - BASE).abs() < 1e-12);
    }

    #[test]
    fn test_raw_sigma_grows_with_load() {
        let calm = raw_sigma(0.1, 0.1, 0.65, 0.0);
        let loaded = raw_sigma(1.5, 0.5, 0.2, 0.0);
        assert!(loaded > calm);
        // 0.05 + 0.15 * 2.0 + 0.1 * 0.45
        assert!((loaded - 0.395).abs() < 1e-12);
    }

    #[test]
    fn test_optimized_sigma_lower_and_clipped() {
        let base = sigma(1.8, 0.5, 0.2, 0.0, &SetupModifiers::BASELINE);
        let opt = sigma(1.8, 0.5, 0.2, 0.0, &SetupModifiers::OPTIMIZED);
        assert!(opt < base);
        assert!(opt >= 0.01);

        let floor = sigma(0.0, 0.0, 0.65, -1.0, &SetupModifiers::BASELINE);
        assert!((floor - 0.01).abs() < f64::EPSILON);
        let ceiling = sigma(10.0, 10.0, 0.0, 0.0, &SetupModifiers::BASELINE);
        assert!((ceiling - 0.6).abs() < f64::EPSILON);
    }
}
