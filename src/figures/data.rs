//! Data preparation for the figure panels
//!
//! Pure functions, no drawing: everything here is unit-tested directly.

use super::{BarGroups, BarStat};
use crate::circuit::{segment_of_sample, segment_windows};
use crate::stats::descriptive::{mean, quantile_sorted, sorted, std_dev};
use crate::stats::special::normal_quantile;
use crate::telemetry::{Channel, Setup, TelemetryDataset, TelemetryFrame};
use crate::{Error, Result};

/// Bin counts of `values` over `range` split into `bins` equal bins.
///
/// Values outside the range (and NaN) are ignored; the upper edge falls into
/// the last bin.
#[must_use]
pub fn histogram(values: &[f64], bins: usize, range: (f64, f64)) -> Vec<usize> {
    let (lo, hi) = range;
    let mut counts = vec![0_usize; bins];
    if bins == 0 || hi <= lo {
        return counts;
    }
    #[allow(clippy::cast_precision_loss)]
    let width = (hi - lo) / bins as f64;
    for &v in values {
        if !(lo..=hi).contains(&v) {
            continue;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
}

/// Finite `(min, max)` over several samples, widened when degenerate.
#[must_use]
pub fn value_range<'a>(samples: impl IntoIterator<Item = &'a [f64]>) -> (f64, f64) {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for s in samples {
        for &v in s.iter().filter(|v| v.is_finite()) {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < 1e-12 {
        return (lo - 0.5, hi + 0.5);
    }
    (lo, hi)
}

/// Tukey box-plot statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStats {
    /// First quartile
    pub q1: f64,
    /// Median
    pub median: f64,
    /// Third quartile
    pub q3: f64,
    /// Smallest value within `q1 − 1.5·IQR`
    pub lower_whisker: f64,
    /// Largest value within `q3 + 1.5·IQR`
    pub upper_whisker: f64,
    /// Values beyond the whiskers
    pub outliers: usize,
}

/// Box-plot statistics with 1.5·IQR whiskers.
///
/// # Errors
///
/// Returns `InsufficientData` for an empty sample.
pub fn box_stats(values: &[f64]) -> Result<BoxStats> {
    if values.is_empty() {
        return Err(Error::InsufficientData {
            what: "box plot".to_string(),
            needed: 1,
            got: 0,
        });
    }
    let s = sorted(values);
    let q1 = quantile_sorted(&s, 0.25);
    let q3 = quantile_sorted(&s, 0.75);
    let fence = 1.5 * (q3 - q1);
    let (lo_fence, hi_fence) = (q1 - fence, q3 + fence);

    let inside: Vec<f64> = s
        .iter()
        .copied()
        .filter(|v| (lo_fence..=hi_fence).contains(v))
        .collect();
    let (lower_whisker, upper_whisker) = match (inside.first(), inside.last()) {
        (Some(&lo), Some(&hi)) => (lo, hi),
        _ => (q1, q3),
    };
    Ok(BoxStats {
        q1,
        median: quantile_sorted(&s, 0.5),
        q3,
        lower_whisker,
        upper_whisker,
        outliers: s.len() - inside.len(),
    })
}

/// Normal Q-Q points `(theoretical quantile, ordered sample value)`.
///
/// Plotting positions are `(i + 0.5) / n`.
#[must_use]
pub fn qq_points(values: &[f64]) -> Vec<(f64, f64)> {
    let s = sorted(values);
    #[allow(clippy::cast_precision_loss)]
    let n = s.len() as f64;
    s.into_iter()
        .enumerate()
        .map(|(i, v)| {
            #[allow(clippy::cast_precision_loss)]
            let p = (i as f64 + 0.5) / n;
            (normal_quantile(p), v)
        })
        .collect()
}

/// Reference line `(intercept, slope)` of a Q-Q plot: sample mean and std.
#[must_use]
pub fn qq_reference(values: &[f64]) -> (f64, f64) {
    (mean(values), std_dev(values))
}

/// `[start, end)` row ranges of contiguous equal lap indices.
#[must_use]
pub fn lap_runs(laps: &[u32]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=laps.len() {
        if i == laps.len() || laps[i] != laps[start] {
            if i > start {
                runs.push((start, i));
            }
            start = i;
        }
    }
    runs
}

/// Mean of `channel` per lap (rows) and lap-phase bin (columns).
///
/// Laps are taken in order of appearance. A sample's phase is its position
/// within its lap; cells without samples are NaN.
#[must_use]
pub fn heatmap_grid(frame: &TelemetryFrame, channel: Channel, phase_bins: usize) -> Vec<Vec<f64>> {
    let values = frame.column(channel);
    if phase_bins == 0 {
        return Vec::new();
    }
    lap_runs(frame.laps())
        .into_iter()
        .map(|(start, end)| {
            let len = end - start;
            let mut sums = vec![0.0; phase_bins];
            let mut counts = vec![0_usize; phase_bins];
            for (pos, &v) in values[start..end].iter().enumerate() {
                let bin = (pos * phase_bins / len).min(phase_bins - 1);
                sums[bin] += v;
                counts[bin] += 1;
            }
            sums.into_iter()
                .zip(counts)
                .map(|(s, c)| {
                    #[allow(clippy::cast_precision_loss)]
                    let mean = if c == 0 { f64::NAN } else { s / c as f64 };
                    mean
                })
                .collect()
        })
        .collect()
}

/// One group of a grouped bar chart.
#[derive(Debug, Clone, PartialEq)]
pub struct BarGroup {
    /// Axis label
    pub label: String,
    /// Baseline bar height
    pub baseline: f64,
    /// Optimized bar height
    pub optimized: f64,
}

impl BarGroup {
    /// Optimized height relative to the baseline (baseline = 100).
    ///
    /// NaN when the baseline is zero.
    #[must_use]
    pub fn optimized_pct(&self) -> f64 {
        if self.baseline == 0.0 {
            f64::NAN
        } else {
            self.optimized / self.baseline * 100.0
        }
    }
}

fn reduce(values: &[f64], stat: BarStat) -> f64 {
    match stat {
        BarStat::Mean => mean(values),
        BarStat::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        BarStat::AbsMean => mean(values).abs(),
    }
}

/// Per-lap means of `channel`, laps in order of appearance.
fn lap_means(frame: &TelemetryFrame, channel: Channel) -> Vec<f64> {
    let values = frame.column(channel);
    lap_runs(frame.laps())
        .into_iter()
        .map(|(start, end)| mean(&values[start..end]))
        .collect()
}

/// Per-segment means of `channel` in lap order; each lap is mapped onto the
/// circuit layout by its own length.
fn segment_means(frame: &TelemetryFrame, channel: Channel) -> Vec<f64> {
    let values = frame.column(channel);
    let runs = lap_runs(frame.laps());
    segment_windows()
        .into_iter()
        .map(|segment| {
            let picked: Vec<f64> = runs
                .iter()
                .flat_map(|&(start, end)| {
                    (start..end)
                        .filter(move |&i| {
                            segment_of_sample(i - start, end - start).0.key() == segment.key()
                        })
                        .map(|i| values[i])
                })
                .collect();
            if picked.is_empty() {
                f64::NAN
            } else {
                mean(&picked)
            }
        })
        .collect()
}

/// Bar heights of both setups for a [`BarGroups`] selection.
///
/// Laps pair up by their order within each setup; a setup with fewer laps
/// leaves the extra groups out.
#[must_use]
pub fn bar_groups(dataset: &TelemetryDataset, groups: &BarGroups) -> Vec<BarGroup> {
    let pair = |label: String, b: f64, o: f64| BarGroup {
        label,
        baseline: b,
        optimized: o,
    };
    match groups {
        BarGroups::Metrics(metrics) => metrics
            .iter()
            .map(|m| {
                let value = |s: Setup| reduce(dataset.column(s, m.channel), m.stat);
                pair(m.label(), value(Setup::Baseline), value(Setup::Optimized))
            })
            .collect(),
        BarGroups::Laps(channel) => {
            let b = lap_means(dataset.frame(Setup::Baseline), *channel);
            let o = lap_means(dataset.frame(Setup::Optimized), *channel);
            b.into_iter()
                .zip(o)
                .enumerate()
                .map(|(i, (b, o))| pair(format!("L{}", i + 1), b, o))
                .collect()
        }
        BarGroups::Turns(channel) => {
            let b = segment_means(dataset.frame(Setup::Baseline), *channel);
            let o = segment_means(dataset.frame(Setup::Optimized), *channel);
            segment_windows()
                .into_iter()
                .zip(b.into_iter().zip(o))
                .filter(|(_, (b, o))| b.is_finite() && o.is_finite())
                .map(|(segment, (b, o))| pair(segment.key().to_string(), b, o))
                .collect()
        }
    }
}

/// Every `step`-th point, so at most `max_points` remain.
#[must_use]
pub fn thin<T: Copy>(points: &[T], max_points: usize) -> Vec<T> {
    let step = points.len().div_ceil(max_points.max(1)).max(1);
    points.iter().step_by(step).copied().collect()
}
