//! Special functions behind the p-values
//!
//! Plain `f64` implementations: log-gamma (Lanczos), the regularized
//! incomplete beta function (Lentz continued fraction), the survival
//! functions built on it, the Kolmogorov distribution and the normal
//! quantile.
//!
//! References:
//! - Press et al. (2007): Numerical Recipes, 3rd ed., §6.1, §6.4, §14.3
//! - Acklam (2003): An algorithm for computing the inverse normal CDF

use std::f64::consts::PI;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEF: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function for `x > 0`.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection: Γ(x)Γ(1−x) = π / sin(πx)
        return (PI / (PI * x).sin()).abs().ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = LANCZOS_COEF[0];
    for (i, &c) in LANCZOS_COEF.iter().enumerate().skip(1) {
        #[allow(clippy::cast_precision_loss)]
        let k = i as f64;
        acc += c / (x + k);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

const BETACF_MAX_ITER: usize = 500;
const BETACF_EPS: f64 = 1e-15;
const FPMIN: f64 = 1e-300;

/// Continued fraction for the incomplete beta function (modified Lentz).
fn betacf(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=BETACF_MAX_ITER {
        #[allow(clippy::cast_precision_loss)]
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < BETACF_EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta `I_x(a, b)` for `a, b > 0`.
///
/// `x` is clamped to `[0, 1]`.
#[must_use]
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    let value = if x < (a + 1.0) / (a + b + 2.0) {
        front * betacf(a, b, x) / a
    } else {
        1.0 - front * betacf(b, a, 1.0 - x) / b
    };
    value.clamp(0.0, 1.0)
}

/// Upper tail `P(T > t)` of Student's t with `df` degrees of freedom.
#[must_use]
pub fn student_t_sf(t: f64, df: f64) -> f64 {
    let tail = 0.5 * regularized_incomplete_beta(0.5 * df, 0.5, df / (df + t * t));
    if t >= 0.0 {
        tail
    } else {
        1.0 - tail
    }
}

/// Two-sided p-value `P(|T| > |t|)`.
#[must_use]
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    regularized_incomplete_beta(0.5 * df, 0.5, df / (df + t * t))
}

/// Upper tail `P(F > f)` of the F distribution with `(d1, d2)` degrees of freedom.
#[must_use]
pub fn f_sf(f: f64, d1: f64, d2: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    regularized_incomplete_beta(0.5 * d2, 0.5 * d1, d2 / (d2 + d1 * f))
}

/// Kolmogorov survival function `Q(λ) = 2 Σ (−1)^(k−1) exp(−2k²λ²)`.
#[must_use]
pub fn kolmogorov_sf(lambda: f64) -> f64 {
    const EPS1: f64 = 1e-3;
    const EPS2: f64 = 1e-10;
    if lambda < 0.2 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut prev_term = 0.0_f64;
    for k in 1..=100_i32 {
        let k = f64::from(k);
        let term = fac * (a2 * k * k).exp();
        sum += term;
        if term.abs() <= EPS1 * prev_term || term.abs() <= EPS2 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        prev_term = term.abs();
    }
    1.0
}

/// Inverse of the standard normal CDF for `p ∈ (0, 1)`.
///
/// Returns ±∞ at the endpoints and NaN outside.
#[must_use]
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.024_25;

    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ln_gamma_known_values() {
        // Γ(1) = Γ(2) = 1, Γ(5) = 24, Γ(0.5) = √π
        assert!(ln_gamma(1.0).abs() < 1e-12);
        assert!(ln_gamma(2.0).abs() < 1e-12);
        assert!((ln_gamma(5.0) - 24.0_f64.ln()).abs() < 1e-12);
        assert!((ln_gamma(0.5) - PI.sqrt().ln()).abs() < 1e-12);
        assert!((ln_gamma(0.1) - 2.252_712_651_734_206).abs() < 1e-10);
    }

    #[test]
    fn test_incomplete_beta() {
        assert!(regularized_incomplete_beta(2.0, 3.0, 0.0).abs() < f64::EPSILON);
        assert!((regularized_incomplete_beta(2.0, 3.0, 1.0) - 1.0).abs() < f64::EPSILON);
        // I_x(1, 1) = x
        assert!((regularized_incomplete_beta(1.0, 1.0, 0.3) - 0.3).abs() < 1e-12);
        // I_x(a, 1) = x^a
        assert!((regularized_incomplete_beta(3.0, 1.0, 0.5) - 0.125).abs() < 1e-12);
        // Symmetry I_x(a, b) = 1 − I_{1−x}(b, a)
        let lhs = regularized_incomplete_beta(2.5, 4.0, 0.35);
        let rhs = 1.0 - regularized_incomplete_beta(4.0, 2.5, 0.65);
        assert!((lhs - rhs).abs() < 1e-12);
    }

    #[test]
    fn test_student_t() {
        // df = 1 is Cauchy: P(T > 1) = 0.25
        assert!((student_t_sf(1.0, 1.0) - 0.25).abs() < 1e-10);
        assert!((student_t_sf(0.0, 7.0) - 0.5).abs() < 1e-12);
        assert!((student_t_sf(-1.0, 1.0) - 0.75).abs() < 1e-10);
        // Two-sided 5% critical value for df = 10 is 2.228139
        assert!((student_t_two_sided(2.228_139, 10.0) - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_f_sf() {
        assert!((f_sf(0.0, 1.0, 10.0) - 1.0).abs() < f64::EPSILON);
        // F(1, d) = T(d)²: P(F > t²) = two-sided t p-value
        let t: f64 = 2.228_139;
        assert!((f_sf(t * t, 1.0, 10.0) - student_t_two_sided(t, 10.0)).abs() < 1e-10);
    }

    #[test]
    fn test_kolmogorov_sf() {
        assert!((kolmogorov_sf(0.0) - 1.0).abs() < f64::EPSILON);
        // Classic 5% critical value
        assert!((kolmogorov_sf(1.358) - 0.05).abs() < 1e-3);
        assert!(kolmogorov_sf(3.0) < 1e-6);
    }

    #[test]
    fn test_normal_quantile() {
        assert!(normal_quantile(0.5).abs() < 1e-9);
        assert!((normal_quantile(0.975) - 1.959_963_985).abs() < 1e-6);
        assert!((normal_quantile(0.01) + 2.326_347_874).abs() < 1e-6);
        assert!(normal_quantile(0.0).is_infinite());
        assert!(normal_quantile(1.5).is_nan());
    }
}
