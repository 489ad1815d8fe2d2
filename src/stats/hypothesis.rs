//! Two-sample hypothesis tests
//!
//! - Welch's t-test (unequal variances, Welch–Satterthwaite df)
//! - Cohen's d with the root-mean-square pooled standard deviation
//! - Levene's test, median-centred (Brown–Forsythe)
//! - Two-sample Kolmogorov–Smirnov with the asymptotic p-value
//!
//! References:
//! - Welch (1947): The generalization of Student's problem
//! - Brown & Forsythe (1974): Robust tests for the equality of variances
//! - Stephens (1970): Use of the Kolmogorov–Smirnov statistic

use super::descriptive::{mean, median, sorted, variance};
use super::special::{f_sf, kolmogorov_sf, student_t_two_sided};
use crate::{Error, Result};
use serde::Serialize;

/// Outcome of a two-sample test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestResult {
    /// Test statistic (t, W or D)
    pub statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Degrees of freedom, where the test has them
    pub df: Option<f64>,
}

fn require(what: &str, needed: usize, sample: &[f64]) -> Result<()> {
    if sample.len() < needed {
        return Err(Error::InsufficientData {
            what: what.to_string(),
            needed,
            got: sample.len(),
        });
    }
    Ok(())
}

/// Welch's unequal-variance t-test.
///
/// # Errors
///
/// - `InsufficientData` if either sample has fewer than 2 observations
/// - `InvalidInput` if both samples have zero variance
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<TestResult> {
    require("Welch t-test", 2, a)?;
    require("Welch t-test", 2, b)?;

    #[allow(clippy::cast_precision_loss)]
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (va, vb) = (variance(a) / na, variance(b) / nb);
    let se2 = va + vb;
    if se2 <= 0.0 {
        return Err(Error::InvalidInput(
            "Welch t-test undefined: both samples have zero variance".to_string(),
        ));
    }

    let t = (mean(a) - mean(b)) / se2.sqrt();
    let df = se2 * se2 / (va * va / (na - 1.0) + vb * vb / (nb - 1.0));
    Ok(TestResult {
        statistic: t,
        p_value: student_t_two_sided(t, df),
        df: Some(df),
    })
}

/// Cohen's d: `(mean_a − mean_b) / sqrt((s_a² + s_b²) / 2)`.
///
/// # Errors
///
/// - `InsufficientData` if either sample has fewer than 2 observations
/// - `InvalidInput` if the pooled standard deviation is zero
pub fn cohens_d(a: &[f64], b: &[f64]) -> Result<f64> {
    require("Cohen's d", 2, a)?;
    require("Cohen's d", 2, b)?;
    let pooled = ((variance(a) + variance(b)) / 2.0).sqrt();
    if pooled <= 0.0 {
        return Err(Error::InvalidInput(
            "Cohen's d undefined: pooled standard deviation is zero".to_string(),
        ));
    }
    Ok((mean(a) - mean(b)) / pooled)
}

/// Levene's test for equal variances, centred on the median.
///
/// # Errors
///
/// - `InsufficientData` if either sample has fewer than 2 observations
/// - `InvalidInput` if every observation equals its group median
pub fn levene_test(a: &[f64], b: &[f64]) -> Result<TestResult> {
    require("Levene test", 2, a)?;
    require("Levene test", 2, b)?;

    let deviations = |s: &[f64]| {
        let m = median(s);
        s.iter().map(|v| (v - m).abs()).collect::<Vec<_>>()
    };
    let za = deviations(a);
    let zb = deviations(b);
    let (ma, mb) = (mean(&za), mean(&zb));

    #[allow(clippy::cast_precision_loss)]
    let (na, nb) = (za.len() as f64, zb.len() as f64);
    let n = na + nb;
    let grand = (ma * na + mb * nb) / n;

    let between = na * (ma - grand).powi(2) + nb * (mb - grand).powi(2);
    let within: f64 = za.iter().map(|z| (z - ma).powi(2)).sum::<f64>()
        + zb.iter().map(|z| (z - mb).powi(2)).sum::<f64>();
    if within <= 0.0 {
        return Err(Error::InvalidInput(
            "Levene test undefined: no spread around the group medians".to_string(),
        ));
    }

    // k = 2 groups
    let (d1, d2) = (1.0, n - 2.0);
    let w = d2 / d1 * between / within;
    Ok(TestResult {
        statistic: w,
        p_value: f_sf(w, d1, d2),
        df: None,
    })
}

/// Two-sample Kolmogorov–Smirnov test with the asymptotic p-value.
///
/// # Errors
///
/// Returns `InsufficientData` if either sample is empty.
pub fn ks_two_sample(a: &[f64], b: &[f64]) -> Result<TestResult> {
    require("Kolmogorov-Smirnov test", 1, a)?;
    require("Kolmogorov-Smirnov test", 1, b)?;

    let sa = sorted(a);
    let sb = sorted(b);
    #[allow(clippy::cast_precision_loss)]
    let (na, nb) = (sa.len() as f64, sb.len() as f64);

    // Both ECDFs only change at sample points; evaluate just after each one
    let mut d: f64 = 0.0;
    for &x in sa.iter().chain(&sb) {
        #[allow(clippy::cast_precision_loss)]
        let fa = sa.partition_point(|&v| v <= x) as f64 / na;
        #[allow(clippy::cast_precision_loss)]
        let fb = sb.partition_point(|&v| v <= x) as f64 / nb;
        d = d.max((fa - fb).abs());
    }

    let ne = na * nb / (na + nb);
    let sqrt_ne = ne.sqrt();
    let lambda = (sqrt_ne + 0.12 + 0.11 / sqrt_ne) * d;
    Ok(TestResult {
        statistic: d,
        p_value: kolmogorov_sf(lambda),
        df: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welch_textbook_example() {
        let a = [
            27.5, 21.0, 19.0, 23.6, 17.0, 17.9, 16.9, 20.1, 21.9, 22.6, 23.1, 19.6, 19.0, 21.7,
            21.4,
        ];
        let b = [
            27.1, 22.0, 20.8, 23.4, 23.4, 23.5, 25.8, 22.0, 24.8, 20.2, 21.9, 22.1, 22.9, 20.5,
            24.4,
        ];
        let r = welch_t_test(&a, &b).unwrap();
        assert!((r.statistic + 2.455_4).abs() < 1e-3, "t = {}", r.statistic);
        assert!((r.df.unwrap() - 24.988).abs() < 1e-2);
        assert!((r.p_value - 0.021_38).abs() < 1e-4, "p = {}", r.p_value);
    }

    #[test]
    fn test_welch_identical_samples() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let r = welch_t_test(&a, &a).unwrap();
        assert!(r.statistic.abs() < 1e-12);
        assert!((r.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_welch_rejects_degenerate_input() {
        assert!(matches!(
            welch_t_test(&[1.0], &[1.0, 2.0]),
            Err(Error::InsufficientData { .. })
        ));
        assert!(matches!(
            welch_t_test(&[3.0, 3.0], &[3.0, 3.0]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cohens_d() {
        // Equal std = 1, means 1 apart
        let a = [1.0, 2.0, 3.0];
        let b = [0.0, 1.0, 2.0];
        assert!((cohens_d(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert!((cohens_d(&b, &a).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_levene_equal_spread() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [11.0, 12.0, 13.0, 14.0, 15.0];
        let r = levene_test(&a, &b).unwrap();
        assert!(r.statistic.abs() < 1e-12);
        assert!((r.p_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_levene_unequal_spread() {
        let a: Vec<f64> = (0..50_i32).map(|i| f64::from(i % 5)).collect();
        let b: Vec<f64> = (0..50_i32).map(|i| f64::from(i % 5) * 20.0).collect();
        let r = levene_test(&a, &b).unwrap();
        assert!(r.statistic > 10.0);
        assert!(r.p_value < 0.001);
    }

    #[test]
    fn test_ks_disjoint_and_identical() {
        let a: Vec<f64> = (0..100_i32).map(f64::from).collect();
        let b: Vec<f64> = (200..300_i32).map(f64::from).collect();
        let r = ks_two_sample(&a, &b).unwrap();
        assert!((r.statistic - 1.0).abs() < f64::EPSILON);
        assert!(r.p_value < 1e-10);

        let same = ks_two_sample(&a, &a).unwrap();
        assert!(same.statistic.abs() < f64::EPSILON);
        assert!((same.p_value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ks_half_shift() {
        let a: Vec<f64> = (0..10_i32).map(f64::from).collect();
        let b: Vec<f64> = (5..15_i32).map(f64::from).collect();
        let r = ks_two_sample(&a, &b).unwrap();
        assert!((r.statistic - 0.5).abs() < 1e-12);
    }
}
