//! H1/H2 validation tables
//!
//! Emulated evidence for the two secondary hypotheses:
//!
//! | Table | Source |
//! |-------|--------|
//! | Skill-atom segmentation | Seeded annotation/detection model |
//! | Segmentation summary | Precision, recall, F1, IoU per atom |
//! | MQTT latency | Seeded two-hop gamma latency model |
//! | MQTT summary | p50/p95/p99/max per path |
//! | Time-loss attribution | Sector speeds of the study dataset |
//!
//! Segmentation draws from the seeded stream first, latency second, so the
//! tables are reproducible per seed. Only the time-loss table reads the
//! telemetry.

pub mod latency;
pub mod segmentation;
pub mod time_loss;

pub use latency::{simulate_latency, summarize_latency, LatencyRecord, LatencySummary};
pub use segmentation::{
    simulate_segmentation, summarize_segmentation, temporal_iou, AtomRecord, AtomSummary,
    SkillAtom,
};
pub use time_loss::{attribute_time_loss, sector_time, SectorTimeLoss};

use crate::config::StudyConfig;
use crate::storage::write_rows;
use crate::telemetry::TelemetryDataset;
use crate::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-window skill-atom records
pub const SEGMENTATION_FILE: &str = "Table_v4_Skill_Atom_Segmentation.csv";
/// Per-atom detection quality
pub const SEGMENTATION_SUMMARY_FILE: &str = "Table_v4_Segmentation_Summary.csv";
/// Per-message latency records
pub const MQTT_LATENCY_FILE: &str = "Table_v4_MQTT_Latency.csv";
/// Latency percentiles per path
pub const MQTT_SUMMARY_FILE: &str = "Table_v4_MQTT_Summary.csv";
/// Sector time-loss breakdown
pub const TIME_LOSS_FILE: &str = "Table_v4_Time_Loss_Attribution.csv";

/// All five H1/H2 tables.
#[derive(Debug, Clone, PartialEq)]
pub struct H1h2Tables {
    /// Skill-atom records
    pub segmentation: Vec<AtomRecord>,
    /// Per-atom summary
    pub segmentation_summary: Vec<AtomSummary>,
    /// Latency records
    pub latency: Vec<LatencyRecord>,
    /// Per-path summary
    pub latency_summary: Vec<LatencySummary>,
    /// Sector rows plus `Total`
    pub time_loss: Vec<SectorTimeLoss>,
}

impl H1h2Tables {
    /// Build every table from the config seed and the study dataset.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if the dataset has too few moving samples
    /// for the configured sectors or no message was emulated.
    pub fn compute(config: &StudyConfig, dataset: &TelemetryDataset) -> Result<Self> {
        let h = &config.h1h2;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let segmentation = simulate_segmentation(h.segmentation_samples, &mut rng)?;
        let latency = simulate_latency(h.messages, h.message_interval_s, &mut rng)?;
        let tables = Self {
            segmentation_summary: summarize_segmentation(&segmentation),
            latency_summary: summarize_latency(&latency)?,
            time_loss: attribute_time_loss(dataset, h.sectors, h.sector_distance_m)?,
            segmentation,
            latency,
        };
        info!(
            windows = h.segmentation_samples,
            messages = h.messages,
            sectors = h.sectors,
            "H1/H2 tables computed"
        );
        Ok(tables)
    }

    /// Write the five CSVs into `dir`, returning their paths.
    ///
    /// # Errors
    ///
    /// Returns error if `dir` or a file cannot be written.
    pub fn write_csv(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(vec![
            write_rows(dir.join(SEGMENTATION_FILE), &self.segmentation)?,
            write_rows(dir.join(SEGMENTATION_SUMMARY_FILE), &self.segmentation_summary)?,
            write_rows(dir.join(MQTT_LATENCY_FILE), &self.latency)?,
            write_rows(dir.join(MQTT_SUMMARY_FILE), &self.latency_summary)?,
            write_rows(dir.join(TIME_LOSS_FILE), &self.time_loss)?,
        ])
    }

    /// Console digest of the summaries.
    #[must_use]
    pub fn render(&self) -> String {
        let rule = "-".repeat(72);
        let mut out = String::new();

        let _ = writeln!(out, "H1 SKILL-ATOM SEGMENTATION");
        let _ = writeln!(out, "{rule}");
        for s in &self.segmentation_summary {
            let _ = writeln!(
                out,
                "{:<4} | precision {:.3} | F1 {:.3} | IoU {:.3} ± {:.3} | n = {}",
                s.skill_atom,
                s.precision,
                s.f1_score,
                s.mean_temporal_iou,
                s.std_temporal_iou,
                s.samples
            );
        }

        let _ = writeln!(out, "\nH2 MQTT LATENCY (ms)");
        let _ = writeln!(out, "{rule}");
        for s in &self.latency_summary {
            let _ = writeln!(
                out,
                "{:<14} | p50 {:>7.1} | p95 {:>7.1} | p99 {:>7.1} | loss {:.3}%",
                s.path, s.p50_ms, s.p95_ms, s.p99_ms, s.packet_loss_pct
            );
        }

        if let Some(total) = self.time_loss.last() {
            let _ = writeln!(out, "\nTIME-LOSS ATTRIBUTION");
            let _ = writeln!(out, "{rule}");
            let _ = writeln!(
                out,
                "gain {:.3} s: setup {:.3} s, rider {:.3} s, other {:.3} s",
                total.time_delta_s,
                total.setup_contribution_s,
                total.rider_contribution_s,
                total.other_contribution_s
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::read_table;
    use crate::telemetry::generate_dataset;
    use tempfile::TempDir;

    fn small() -> StudyConfig {
        StudyConfig::builder().seed(11).laps_per_setup(1).build()
    }

    #[test]
    fn test_compute_sizes_follow_config() {
        let config = small();
        let ds = generate_dataset(&config).unwrap();
        let tables = H1h2Tables::compute(&config, &ds).unwrap();
        assert_eq!(tables.segmentation.len(), 100);
        assert_eq!(tables.segmentation_summary.len(), 2);
        assert_eq!(tables.latency.len(), 1_000);
        assert_eq!(tables.latency_summary.len(), 3);
        assert_eq!(tables.time_loss.len(), 5);

        let again = H1h2Tables::compute(&config, &ds).unwrap();
        assert_eq!(tables, again);
        assert!(tables.render().contains("End-to-End"));
    }

    #[test]
    fn test_write_csv_headers() {
        let config = small();
        let ds = generate_dataset(&config).unwrap();
        let tables = H1h2Tables::compute(&config, &ds).unwrap();
        let dir = TempDir::new().unwrap();
        let paths = tables.write_csv(dir.path()).unwrap();
        assert_eq!(paths.len(), 5);

        let summary = read_table(dir.path().join(SEGMENTATION_SUMMARY_FILE)).unwrap();
        assert_eq!(summary.num_rows(), 2);
        assert_eq!(summary.cells("skill_atom").unwrap(), ["AS", "CE"]);

        let loss = read_table(dir.path().join(TIME_LOSS_FILE)).unwrap();
        assert_eq!(loss.num_rows(), 5);
        assert_eq!(loss.cells("sector").unwrap().last(), Some(&"Total"));

        let latency = read_table(dir.path().join(MQTT_LATENCY_FILE)).unwrap();
        assert_eq!(latency.num_rows(), 1_000);
    }
}
