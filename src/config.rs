//! Study configuration
//!
//! All knobs of a run live in [`StudyConfig`]. Defaults reproduce the v4
//! case study (seed `1854652912`, 100 Hz, 10 laps of 10 s per setup), so an
//! empty JSON object is a valid config file.
//!
//! ```rust
//! use jerez_telemetry::config::StudyConfig;
//!
//! let config = StudyConfig::builder().seed(7).laps_per_setup(2).build();
//! assert_eq!(config.samples_per_setup(), 2_000);
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fixed seed of the published dataset
pub const DEFAULT_SEED: u64 = 1_854_652_912;

/// Dataset file stem shared by the CSV, Parquet and MDF4 exports
pub const DATASET_STEM: &str = "jerez_telemetry_v4";

/// Configuration of a full study run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// RNG seed for noise injection
    pub seed: u64,
    /// Sampling rate (Hz)
    pub sample_rate_hz: u32,
    /// Lap duration (s)
    pub lap_duration_s: u32,
    /// Laps generated per setup
    pub laps_per_setup: u32,
    /// Root of every output file
    pub output_dir: PathBuf,
    /// Raster resolution of figures
    pub figure_dpi: u32,
    /// Significance level for the hypothesis tests
    pub significance_level: f64,
    /// Row count the verifier expects
    pub expected_rows: usize,
    /// Minimum numeric channel count the verifier expects
    pub expected_channels: usize,
    /// Also write the dataset as Parquet next to the CSV
    pub export_parquet: bool,
    /// Reference Glicko tournament parameters
    pub glicko: GlickoConfig,
    /// Emulated H1/H2 table parameters
    pub h1h2: H1h2Config,
    /// MDF4 header metadata
    pub mdf4: Mdf4Metadata,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            sample_rate_hz: 100,
            lap_duration_s: 10,
            laps_per_setup: 10,
            output_dir: PathBuf::from("output"),
            figure_dpi: 300,
            significance_level: 0.05,
            expected_rows: 20_000,
            expected_channels: 35,
            export_parquet: true,
            glicko: GlickoConfig::default(),
            h1h2: H1h2Config::default(),
            mdf4: Mdf4Metadata::default(),
        }
    }
}

/// Parameters of the reference Glicko round-robin simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlickoConfig {
    /// Number of simulated players
    pub players: usize,
    /// Number of pairing rounds
    pub rounds: usize,
    /// Starting rating of every player
    pub initial_rating: f64,
    /// Starting rating deviation of every player
    pub initial_rd: f64,
}

impl Default for GlickoConfig {
    fn default() -> Self {
        Self {
            players: 10,
            rounds: 20,
            initial_rating: 1500.0,
            initial_rd: 350.0,
        }
    }
}

/// Sizes of the emulated H1/H2 tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct H1h2Config {
    /// Expert-annotated windows, split evenly between the setups
    pub segmentation_samples: usize,
    /// Emulated MQTT messages
    pub messages: usize,
    /// Interval between messages (s)
    pub message_interval_s: f64,
    /// Sectors of the time-loss breakdown
    pub sectors: usize,
    /// Nominal length of one sector (m)
    pub sector_distance_m: f64,
}

impl Default for H1h2Config {
    fn default() -> Self {
        Self {
            segmentation_samples: 50,
            messages: 1_000,
            message_interval_s: 0.01,
            sectors: 4,
            sector_distance_m: 100.0,
        }
    }
}

/// Free-text metadata stored in the MDF4 header comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mdf4Metadata {
    /// Author field
    pub author: String,
    /// Department field
    pub department: String,
    /// Project field
    pub project: String,
    /// Subject field
    pub subject: String,
}

impl Default for Mdf4Metadata {
    fn default() -> Self {
        Self {
            author: "NMLP Edge Node".to_string(),
            department: "Race Engineering - Telemetry Division".to_string(),
            project: "Jerez Turn 5 gearing case study".to_string(),
            subject: "Gearing optimization via nonlinear lumping analysis".to_string(),
        }
    }
}

impl StudyConfig {
    /// Create a builder starting from the defaults
    #[must_use]
    pub fn builder() -> StudyConfigBuilder {
        StudyConfigBuilder::default()
    }

    /// Load a config from a JSON file; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or holds
    /// out-of-range values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a dataset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(Error::InvalidInput("sample_rate_hz must be > 0".to_string()));
        }
        if self.lap_duration_s == 0 {
            return Err(Error::InvalidInput("lap_duration_s must be > 0".to_string()));
        }
        if self.laps_per_setup == 0 {
            return Err(Error::InvalidInput("laps_per_setup must be > 0".to_string()));
        }
        if self.figure_dpi == 0 {
            return Err(Error::InvalidInput("figure_dpi must be > 0".to_string()));
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(Error::InvalidInput(format!(
                "significance_level must lie in (0, 1), got {}",
                self.significance_level
            )));
        }
        if self.glicko.players < 2 {
            return Err(Error::InvalidInput(
                "glicko.players must be at least 2".to_string(),
            ));
        }
        if self.h1h2.segmentation_samples < 2 || self.h1h2.messages == 0 || self.h1h2.sectors == 0 {
            return Err(Error::InvalidInput(
                "h1h2 needs >= 2 segmentation samples, >= 1 message and >= 1 sector".to_string(),
            ));
        }
        if !(self.h1h2.sector_distance_m > 0.0 && self.h1h2.message_interval_s > 0.0) {
            return Err(Error::InvalidInput(
                "h1h2.sector_distance_m and h1h2.message_interval_s must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Samples in one lap
    #[must_use]
    pub const fn samples_per_lap(&self) -> usize {
        (self.sample_rate_hz * self.lap_duration_s) as usize
    }

    /// Samples generated for each setup
    #[must_use]
    pub const fn samples_per_setup(&self) -> usize {
        self.samples_per_lap() * self.laps_per_setup as usize
    }

    /// Directory of the telemetry dataset files
    #[must_use]
    pub fn datasets_dir(&self) -> PathBuf {
        self.output_dir.join("datasets")
    }

    /// Directory of the metric tables
    #[must_use]
    pub fn tables_dir(&self) -> PathBuf {
        self.output_dir.join("tables")
    }

    /// Directory of rendered figures
    #[must_use]
    pub fn figures_dir(&self) -> PathBuf {
        self.output_dir.join("figures")
    }

    /// Directory of MDF4 exports
    #[must_use]
    pub fn mdf4_dir(&self) -> PathBuf {
        self.output_dir.join("mdf4")
    }

    /// Directory of the reference Glicko simulation outputs
    #[must_use]
    pub fn glicko_dir(&self) -> PathBuf {
        self.output_dir.join("glicko")
    }

    /// Directory of the emulated H1/H2 tables
    #[must_use]
    pub fn h1h2_dir(&self) -> PathBuf {
        self.tables_dir().join("h1h2")
    }

    /// Path of the telemetry CSV
    #[must_use]
    pub fn dataset_csv_path(&self) -> PathBuf {
        self.datasets_dir().join(format!("{DATASET_STEM}.csv"))
    }

    /// Path of the telemetry Parquet export
    #[must_use]
    pub fn dataset_parquet_path(&self) -> PathBuf {
        self.datasets_dir().join(format!("{DATASET_STEM}.parquet"))
    }

    /// Path of the MDF4 export
    #[must_use]
    pub fn mdf4_path(&self) -> PathBuf {
        self.mdf4_dir().join(format!("{DATASET_STEM}.mf4"))
    }
}

/// Builder for `StudyConfig`.
#[derive(Debug, Default)]
pub struct StudyConfigBuilder {
    config: StudyConfig,
}

impl StudyConfigBuilder {
    /// Set the RNG seed
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Set the sampling rate (Hz)
    #[must_use]
    pub const fn sample_rate_hz(mut self, hz: u32) -> Self {
        self.config.sample_rate_hz = hz;
        self
    }

    /// Set the number of laps per setup
    #[must_use]
    pub const fn laps_per_setup(mut self, laps: u32) -> Self {
        self.config.laps_per_setup = laps;
        self
    }

    /// Set the output root
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Set the figure resolution
    #[must_use]
    pub const fn figure_dpi(mut self, dpi: u32) -> Self {
        self.config.figure_dpi = dpi;
        self
    }

    /// Set the row count the verifier expects
    #[must_use]
    pub const fn expected_rows(mut self, rows: usize) -> Self {
        self.config.expected_rows = rows;
        self
    }

    /// Enable or disable the Parquet export
    #[must_use]
    pub const fn export_parquet(mut self, enabled: bool) -> Self {
        self.config.export_parquet = enabled;
        self
    }

    /// Set the Glicko tournament parameters
    #[must_use]
    pub const fn glicko(mut self, glicko: GlickoConfig) -> Self {
        self.config.glicko = glicko;
        self
    }

    /// Set the emulated H1/H2 table sizes
    #[must_use]
    pub const fn h1h2(mut self, h1h2: H1h2Config) -> Self {
        self.config.h1h2 = h1h2;
        self
    }

    /// Build the `StudyConfig`.
    #[must_use]
    pub fn build(self) -> StudyConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_published_dataset() {
        let config = StudyConfig::default();
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.samples_per_lap(), 1_000);
        assert_eq!(config.samples_per_setup(), 10_000);
        assert_eq!(config.samples_per_setup() * 2, config.expected_rows);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: StudyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StudyConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config: StudyConfig =
            serde_json::from_str(r#"{"seed": 3, "glicko": {"rounds": 5}}"#).unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.glicko.rounds, 5);
        assert_eq!(config.glicko.players, 10);
    }

    #[test]
    fn test_validate_rejects_empty_h1h2() {
        let config = StudyConfig::builder()
            .h1h2(H1h2Config {
                sectors: 0,
                ..H1h2Config::default()
            })
            .build();
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
        assert!(StudyConfig::default().h1h2_dir().ends_with("tables/h1h2"));
    }

    #[test]
    fn test_validate_rejects_zero_laps() {
        let config = StudyConfig::builder().laps_per_setup(0).build();
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_output_layout() {
        let config = StudyConfig::builder().output_dir("/tmp/study").build();
        assert_eq!(
            config.dataset_csv_path(),
            PathBuf::from("/tmp/study/datasets/jerez_telemetry_v4.csv")
        );
        assert_eq!(
            config.mdf4_path(),
            PathBuf::from("/tmp/study/mdf4/jerez_telemetry_v4.mf4")
        );
    }
}
