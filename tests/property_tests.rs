//! Property-based tests for jerez-telemetry
//!
//! - Statistical invariants (sign symmetry, bounded p-values)
//! - Generation invariants (clip bounds, seed determinism)
//! - Run with small case counts: dataset generation is the slow part

use jerez_telemetry::config::StudyConfig;
use jerez_telemetry::glicko::{GlickoSystem, Outcome, MAX_RD, MIN_RD};
use jerez_telemetry::report::improvement_pct;
use jerez_telemetry::stats::{cohens_d, ks_two_sample, welch_t_test};
use jerez_telemetry::telemetry::{generate_dataset, Channel};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Sample of 5..60 values with guaranteed spread
fn arb_sample() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-1_000.0f64..1_000.0, 5..60).prop_map(|mut v| {
        v[0] = -2_000.0;
        v[1] = 2_000.0;
        v
    })
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    (1_000.0f64..2_000.0, 30.0f64..350.0, prop_oneof![Just(0.0), Just(0.5), Just(1.0)]).prop_map(
        |(opponent_rating, opponent_rd, score)| Outcome {
            opponent_rating,
            opponent_rd,
            score,
        },
    )
}

// ============================================================================
// Statistics
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: swapping the samples negates t and keeps p
    #[test]
    fn prop_welch_antisymmetric(a in arb_sample(), b in arb_sample()) {
        let ab = welch_t_test(&a, &b).unwrap();
        let ba = welch_t_test(&b, &a).unwrap();
        prop_assert!((ab.statistic + ba.statistic).abs() < 1e-9);
        prop_assert!((ab.p_value - ba.p_value).abs() < 1e-9);
        prop_assert!((0.0..=1.0).contains(&ab.p_value));
    }

    /// Property: Cohen's d changes sign with the sample order
    #[test]
    fn prop_cohens_d_antisymmetric(a in arb_sample(), b in arb_sample()) {
        let ab = cohens_d(&a, &b).unwrap();
        let ba = cohens_d(&b, &a).unwrap();
        prop_assert!((ab + ba).abs() < 1e-9);
    }

    /// Property: KS D lies in [0, 1], is symmetric, and is 0 against itself
    #[test]
    fn prop_ks_bounded(a in arb_sample(), b in arb_sample()) {
        let ab = ks_two_sample(&a, &b).unwrap();
        let ba = ks_two_sample(&b, &a).unwrap();
        prop_assert!((0.0..=1.0).contains(&ab.statistic));
        prop_assert!((ab.statistic - ba.statistic).abs() < 1e-12);
        prop_assert!((0.0..=1.0).contains(&ab.p_value));
        prop_assert_eq!(ks_two_sample(&a, &a).unwrap().statistic, 0.0);
    }

    /// Property: a lower optimized value is a positive improvement
    #[test]
    fn prop_improvement_sign(b in 0.1f64..1_000.0, o in 0.0f64..1_000.0) {
        let pct = improvement_pct(b, o);
        prop_assert_eq!(pct > 0.0, o < b);
    }

    // ========================================================================
    // Glicko
    // ========================================================================

    /// Property: updated RD stays clamped and never grows
    #[test]
    fn prop_glicko_rd_clamped(
        rating in 1_000.0f64..2_000.0,
        rd in 30.0f64..350.0,
        outcomes in proptest::collection::vec(arb_outcome(), 1..20)
    ) {
        let (new_rating, new_rd) = GlickoSystem::default().update(rating, rd, &outcomes);
        prop_assert!(new_rating.is_finite());
        prop_assert!((MIN_RD..=MAX_RD).contains(&new_rd));
        prop_assert!(new_rd <= rd.max(MIN_RD));
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Property: clipping lands inside the documented bounds
    #[test]
    fn prop_clip_within_bounds(value in -1.0e6f64..1.0e6) {
        for channel in Channel::ALL {
            let clipped = channel.clip(value);
            match channel.bounds() {
                Some((lo, hi)) => prop_assert!((lo..=hi).contains(&clipped), "{channel}"),
                None => prop_assert_eq!(clipped, value),
            }
        }
    }
}

// ============================================================================
// Generation (few cases, each builds a dataset)
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    /// Property: every bounded channel respects its bounds for any seed
    #[test]
    fn prop_generated_channels_within_bounds(seed in any::<u64>()) {
        let config = StudyConfig::builder().seed(seed).laps_per_setup(1).build();
        let ds = generate_dataset(&config).unwrap();
        for frame in ds.frames() {
            for channel in Channel::ALL {
                if let Some((lo, hi)) = channel.bounds() {
                    for &v in frame.column(channel) {
                        prop_assert!((lo..=hi).contains(&v), "{channel} = {v}");
                    }
                }
            }
        }
    }

    /// Property: one seed, one dataset
    #[test]
    fn prop_generation_deterministic(seed in any::<u64>()) {
        let config = StudyConfig::builder().seed(seed).laps_per_setup(1).build();
        let first = generate_dataset(&config).unwrap();
        let second = generate_dataset(&config).unwrap();
        prop_assert_eq!(first, second);
    }
}
