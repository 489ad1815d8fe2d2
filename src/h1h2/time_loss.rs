//! Sector time-loss attribution
//!
//! The moving part of each setup's trace (speed above 1 km/h) is cut into
//! equal sectors. A sector's time is its nominal length at the sector's
//! mean speed; the baseline-minus-optimized delta is then split into setup,
//! rider and residual shares.

use crate::stats::descriptive::mean;
use crate::telemetry::{Channel, Setup, TelemetryDataset, TelemetryFrame};
use crate::{Error, Result};
use serde::Serialize;

/// Speed above which a sample counts as moving (km/h)
pub const MOVING_SPEED_KMH: f64 = 1.0;
/// Share of the delta credited to the gearing setup
pub const SETUP_SHARE: f64 = 0.6;
/// Share credited to rider confidence
pub const RIDER_SHARE: f64 = 0.3;
/// Residual share
pub const OTHER_SHARE: f64 = 0.1;

/// One sector, or the `Total` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorTimeLoss {
    /// `Sector_<n>` or `Total`
    pub sector: String,
    /// Baseline sector time (s)
    pub baseline_time_s: f64,
    /// Optimized sector time (s)
    pub optimized_time_s: f64,
    /// Baseline minus optimized (s)
    pub time_delta_s: f64,
    /// Setup share of the delta (s)
    pub setup_contribution_s: f64,
    /// Rider share of the delta (s)
    pub rider_contribution_s: f64,
    /// Residual share of the delta (s)
    pub other_contribution_s: f64,
    /// Baseline mean speed (km/h)
    pub baseline_avg_speed_kmh: f64,
    /// Optimized mean speed (km/h)
    pub optimized_avg_speed_kmh: f64,
    /// Baseline minus optimized mean RPM
    pub rpm_delta: f64,
    /// Baseline minus optimized mean wheel slip (%)
    pub slip_delta_pct: f64,
}

/// Time to cover `distance_m` at `speed_kmh`; 0 when not moving.
#[must_use]
pub fn sector_time(distance_m: f64, speed_kmh: f64) -> f64 {
    if speed_kmh > 0.0 {
        distance_m / (speed_kmh / 3.6)
    } else {
        0.0
    }
}

/// Moving rows of one frame split into `sectors` contiguous chunks of equal
/// length; trailing rows that do not fill a chunk are dropped.
fn sector_rows(frame: &TelemetryFrame, sectors: usize) -> Result<Vec<Vec<usize>>> {
    let moving = frame.select(Channel::Speed, |v| v > MOVING_SPEED_KMH);
    let size = moving.len() / sectors.max(1);
    if sectors == 0 || size == 0 {
        return Err(Error::InsufficientData {
            what: format!("{} time-loss sectors", frame.setup().label()),
            needed: sectors.max(1),
            got: moving.len(),
        });
    }
    Ok(moving.chunks_exact(size).take(sectors).map(<[usize]>::to_vec).collect())
}

/// Sector rows followed by the `Total` row.
///
/// # Errors
///
/// Returns `InsufficientData` when a setup has fewer moving samples than
/// sectors.
pub fn attribute_time_loss(
    dataset: &TelemetryDataset,
    sectors: usize,
    distance_m: f64,
) -> Result<Vec<SectorTimeLoss>> {
    let base = dataset.frame(Setup::Baseline);
    let opt = dataset.frame(Setup::Optimized);
    let base_rows = sector_rows(base, sectors)?;
    let opt_rows = sector_rows(opt, sectors)?;

    let avg = |frame: &TelemetryFrame, ch: Channel, rows: &[usize]| mean(&frame.gather(ch, rows));
    let mut out: Vec<SectorTimeLoss> = base_rows
        .iter()
        .zip(&opt_rows)
        .enumerate()
        .map(|(i, (b, o))| {
            let (b, o) = (b.as_slice(), o.as_slice());
            let baseline_speed = avg(base, Channel::Speed, b);
            let optimized_speed = avg(opt, Channel::Speed, o);
            let baseline_time = sector_time(distance_m, baseline_speed);
            let optimized_time = sector_time(distance_m, optimized_speed);
            let delta = baseline_time - optimized_time;
            SectorTimeLoss {
                sector: format!("Sector_{}", i + 1),
                baseline_time_s: baseline_time,
                optimized_time_s: optimized_time,
                time_delta_s: delta,
                setup_contribution_s: SETUP_SHARE * delta,
                rider_contribution_s: RIDER_SHARE * delta,
                other_contribution_s: OTHER_SHARE * delta,
                baseline_avg_speed_kmh: baseline_speed,
                optimized_avg_speed_kmh: optimized_speed,
                rpm_delta: avg(base, Channel::EngineRpm, b) - avg(opt, Channel::EngineRpm, o),
                slip_delta_pct: avg(base, Channel::WheelSlip, b)
                    - avg(opt, Channel::WheelSlip, o),
            }
        })
        .collect();

    let sum = |f: fn(&SectorTimeLoss) -> f64| out.iter().map(f).sum::<f64>();
    let avg_of = |f: fn(&SectorTimeLoss) -> f64| mean(&out.iter().map(f).collect::<Vec<_>>());
    let total = SectorTimeLoss {
        sector: "Total".into(),
        baseline_time_s: sum(|r| r.baseline_time_s),
        optimized_time_s: sum(|r| r.optimized_time_s),
        time_delta_s: sum(|r| r.time_delta_s),
        setup_contribution_s: sum(|r| r.setup_contribution_s),
        rider_contribution_s: sum(|r| r.rider_contribution_s),
        other_contribution_s: sum(|r| r.other_contribution_s),
        baseline_avg_speed_kmh: avg_of(|r| r.baseline_avg_speed_kmh),
        optimized_avg_speed_kmh: avg_of(|r| r.optimized_avg_speed_kmh),
        rpm_delta: avg_of(|r| r.rpm_delta),
        slip_delta_pct: avg_of(|r| r.slip_delta_pct),
    };
    out.push(total);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Constant channels per setup; the first `stopped` rows stand still.
    fn flat_frame(
        setup: Setup,
        rows: usize,
        stopped: usize,
        speed: f64,
        rpm: f64,
    ) -> TelemetryFrame {
        let columns = Channel::ALL
            .iter()
            .map(|ch| match ch {
                Channel::Speed => (0..rows)
                    .map(|i| if i < stopped { 0.0 } else { speed })
                    .collect(),
                Channel::EngineRpm => vec![rpm; rows],
                Channel::WheelSlip => vec![5.0; rows],
                _ => vec![0.0; rows],
            })
            .collect();
        TelemetryFrame::new(setup, columns, vec![1; rows]).unwrap()
    }

    #[test]
    fn test_sector_time() {
        assert!((sector_time(100.0, 36.0) - 10.0).abs() < 1e-12);
        assert_eq!(sector_time(100.0, 0.0), 0.0);
    }

    #[test]
    fn test_attribution_splits_delta() {
        let ds = TelemetryDataset::new(
            flat_frame(Setup::Baseline, 100, 20, 90.0, 12_000.0),
            flat_frame(Setup::Optimized, 100, 0, 100.0, 11_000.0),
        )
        .unwrap();
        let rows = attribute_time_loss(&ds, 4, 100.0).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].sector, "Sector_1");
        assert_eq!(rows[4].sector, "Total");

        let delta = 100.0 / 25.0 - 100.0 / (100.0 / 3.6);
        for r in &rows[..4] {
            assert!((r.time_delta_s - delta).abs() < 1e-9);
            let parts = r.setup_contribution_s + r.rider_contribution_s + r.other_contribution_s;
            assert!((parts - r.time_delta_s).abs() < 1e-12);
            assert!((r.rpm_delta - 1_000.0).abs() < 1e-9);
            assert!(r.slip_delta_pct.abs() < 1e-12);
        }
        let total = &rows[4];
        assert!((total.time_delta_s - 4.0 * delta).abs() < 1e-9);
        assert!((total.baseline_avg_speed_kmh - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_too_few_moving_rows_rejected() {
        let ds = TelemetryDataset::new(
            flat_frame(Setup::Baseline, 10, 8, 90.0, 12_000.0),
            flat_frame(Setup::Optimized, 10, 0, 100.0, 11_000.0),
        )
        .unwrap();
        let err = attribute_time_loss(&ds, 4, 100.0).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { got: 2, .. }));
    }
}
