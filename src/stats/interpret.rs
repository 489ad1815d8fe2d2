//! Verdict strings derived from test values

/// p-value below which a result is reported as highly significant
pub const HIGHLY_SIGNIFICANT_P: f64 = 0.001;

/// Significance verdict for a p-value at level `alpha`.
#[must_use]
pub fn significance(p_value: f64, alpha: f64) -> &'static str {
    if p_value < HIGHLY_SIGNIFICANT_P {
        "HIGHLY SIGNIFICANT"
    } else if p_value < alpha {
        "SIGNIFICANT"
    } else {
        "NOT SIGNIFICANT"
    }
}

/// Cohen's conventional effect size bands.
#[must_use]
pub fn effect_size(d: f64) -> &'static str {
    let d = d.abs();
    if d >= 0.8 {
        "LARGE"
    } else if d >= 0.5 {
        "MEDIUM"
    } else if d >= 0.2 {
        "SMALL"
    } else {
        "NEGLIGIBLE"
    }
}

/// Levene verdict.
#[must_use]
pub fn variance_equality(p_value: f64, alpha: f64) -> &'static str {
    if p_value < alpha {
        "UNEQUAL VARIANCES"
    } else {
        "EQUAL VARIANCES"
    }
}

/// Kolmogorov–Smirnov verdict.
#[must_use]
pub fn distribution_equality(p_value: f64, alpha: f64) -> &'static str {
    if p_value < alpha {
        "DISTRIBUTIONS DIFFER"
    } else {
        "DISTRIBUTIONS SIMILAR"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_significance_bands() {
        assert_eq!(significance(1e-10, 0.05), "HIGHLY SIGNIFICANT");
        assert_eq!(significance(0.01, 0.05), "SIGNIFICANT");
        assert_eq!(significance(0.05, 0.05), "NOT SIGNIFICANT");
    }

    #[test]
    fn test_effect_size_bands() {
        assert_eq!(effect_size(-1.2), "LARGE");
        assert_eq!(effect_size(0.5), "MEDIUM");
        assert_eq!(effect_size(0.25), "SMALL");
        assert_eq!(effect_size(0.1), "NEGLIGIBLE");
    }

    #[test]
    fn test_equality_verdicts() {
        assert_eq!(variance_equality(0.001, 0.05), "UNEQUAL VARIANCES");
        assert_eq!(variance_equality(0.5, 0.05), "EQUAL VARIANCES");
        assert_eq!(distribution_equality(0.0, 0.05), "DISTRIBUTIONS DIFFER");
        assert_eq!(distribution_equality(0.9, 0.05), "DISTRIBUTIONS SIMILAR");
    }
}
