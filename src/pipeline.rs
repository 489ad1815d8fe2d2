//! End-to-end study run
//!
//! Steps run in-process, in order:
//!
//! 1. **dataset**: generate (or, with `--tables-only`, load) the telemetry CSV
//! 2. **tables**: metric tables into `tables/`
//! 3. **verify**: re-read the CSV and check it
//! 4. **figures**: Figures 5 to 12 into `figures/`
//! 5. **mdf4**: MDF4 export into `mdf4/`
//!
//! Each step ends in a [`StepStatus`]. A failed dataset step skips the steps
//! that need it; table, verification and figure failures only degrade the
//! run. The outcome is summarised in `run_summary.json`.
//!
//! Toyota Way Principles:
//! - **Jidoka**: the verifier stops the line on a critical finding
//! - **Andon**: every step reports its own status, nothing fails silently

use crate::config::StudyConfig;
use crate::figures::{render_figure, standard_figures};
use crate::mdf4::{write_mdf4, Mdf4File, Mdf4Header};
use crate::report::{sci, KeyStatistics, StudyTables};
use crate::storage::{read_csv, write_csv, TelemetryStore};
use crate::telemetry::{generate_dataset, TelemetryDataset};
use crate::verify::{VerificationReport, Verifier};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn};

/// Run summary file name (in the output root)
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Command-line selection flags, as given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunFlags {
    /// Generate the dataset only
    pub data_only: bool,
    /// Build tables from the existing dataset
    pub tables_only: bool,
    /// Also render figures
    pub with_figures: bool,
    /// Also export MDF4
    pub with_mdf4: bool,
    /// Everything
    pub full: bool,
    /// Skip verification
    pub skip_verify: bool,
}

/// Steps selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunOptions {
    /// Produce or load the dataset
    pub dataset: bool,
    /// Load the existing CSV instead of generating
    pub load_existing: bool,
    /// Build tables
    pub tables: bool,
    /// Verify the dataset
    pub verify: bool,
    /// Render figures
    pub figures: bool,
    /// Export MDF4
    pub mdf4: bool,
}

impl RunOptions {
    /// Resolve flags into steps.
    ///
    /// No selection flag means a full run. `--full` adds figures and MDF4.
    #[must_use]
    pub const fn from_flags(flags: &RunFlags) -> Self {
        let selective = flags.data_only || flags.tables_only;
        let full = flags.full || !selective;
        Self {
            dataset: flags.data_only || flags.tables_only || full,
            load_existing: flags.tables_only && !flags.data_only && !flags.full,
            tables: !flags.data_only && (full || flags.tables_only),
            verify: !flags.data_only && !flags.skip_verify && (full || !selective),
            figures: flags.with_figures || flags.full,
            mdf4: flags.with_mdf4 || flags.full,
        }
    }

    /// Requested steps in run order
    #[must_use]
    pub fn steps(&self) -> Vec<Step> {
        [
            (self.dataset, Step::Dataset),
            (self.tables, Step::Tables),
            (self.verify, Step::Verify),
            (self.figures, Step::Figures),
            (self.mdf4, Step::Mdf4),
        ]
        .into_iter()
        .filter_map(|(on, step)| on.then_some(step))
        .collect()
    }
}

/// Pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Dataset generation or loading
    Dataset,
    /// Metric tables
    Tables,
    /// Dataset verification
    Verify,
    /// Figure rendering
    Figures,
    /// MDF4 export
    Mdf4,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dataset => "dataset",
            Self::Tables => "tables",
            Self::Verify => "verify",
            Self::Figures => "figures",
            Self::Mdf4 => "mdf4",
        })
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum StepStatus {
    /// Completed
    Succeeded,
    /// Completed with a non-fatal failure
    Degraded(String),
    /// Failed
    Failed(String),
    /// Not run
    Skipped(String),
}

impl StepStatus {
    /// True for `Failed` and `Skipped`
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Skipped(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "OK",
            Self::Degraded(_) => "DEGRADED",
            Self::Failed(_) => "FAILED",
            Self::Skipped(_) => "SKIPPED",
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// Step
    pub step: Step,
    /// Final status
    #[serde(flatten)]
    pub status: StepStatus,
    /// Wall time (ms)
    pub elapsed_ms: u128,
    /// Files written
    pub outputs: Vec<PathBuf>,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Dataset seed
    pub seed: u64,
    /// Output root
    pub output_dir: PathBuf,
    /// Selected steps
    pub options: RunOptions,
    /// Step outcomes in run order
    pub steps: Vec<StepReport>,
    /// Headline statistics, when a dataset was available
    pub key_statistics: Option<KeyStatistics>,
    /// Verifier findings, when verification ran
    pub verification: Option<VerificationReport>,
    /// Stopped by the interrupt flag; `steps` holds what finished
    pub interrupted: bool,
    /// Console rendering of the tables, when built
    #[serde(skip)]
    pub tables_text: Option<String>,
}

impl RunSummary {
    /// 0 when no requested step failed or was skipped, 1 otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.steps.iter().any(|s| s.status.is_blocking()))
    }

    /// Report of one step
    #[must_use]
    pub fn step(&self, step: Step) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }

    /// Write the summary as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Console summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "RUN SUMMARY (seed {})", self.seed);
        let _ = writeln!(out, "{}", "=".repeat(60));
        for s in &self.steps {
            let reason = match &s.status {
                StepStatus::Succeeded => String::new(),
                StepStatus::Degraded(r) | StepStatus::Failed(r) | StepStatus::Skipped(r) => {
                    format!(" - {r}")
                }
            };
            let _ = writeln!(
                out,
                "  {:<10} {:<9} {:>8} ms{reason}",
                s.step.to_string(),
                s.status.label(),
                s.elapsed_ms
            );
        }
        if let Some(k) = &self.key_statistics {
            let _ = writeln!(out, "\nKey statistics");
            let _ = writeln!(
                out,
                "  sigma mean      {:.4} -> {:.4} ({:+.1}%)",
                k.sigma_baseline_mean, k.sigma_optimized_mean, k.sigma_improvement_pct
            );
            let _ = writeln!(out, "  Welch t         {:.2} (p = {})", k.welch_t, sci(k.welch_p));
            let _ = writeln!(out, "  Cohen's d       {:.2}", k.cohens_d);
            let _ = writeln!(out, "  engine eff.     {:+.2} pp", k.engine_efficiency_delta);
            let _ = writeln!(out, "  wheel slip      {:+.2} pp", k.wheel_slip_delta);
        }
        let _ = writeln!(
            out,
            "\nOutputs in {} (exit code {})",
            self.output_dir.display(),
            self.exit_code()
        );
        out
    }
}

/// Result of one step body: status plus files written.
type StepOutcome = (StepStatus, Vec<PathBuf>);

/// Per-step progress callback
type ProgressHook = Box<dyn Fn(&StepReport) + Send + Sync>;

/// Orchestrates a study run.
pub struct Pipeline {
    config: StudyConfig,
    options: RunOptions,
    interrupted: Arc<AtomicBool>,
    progress: Option<ProgressHook>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("interrupted", &self.interrupted)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Pipeline {
    /// Pipeline over a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configuration is invalid.
    pub fn new(config: StudyConfig, options: RunOptions) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            options,
            interrupted: Arc::new(AtomicBool::new(false)),
            progress: None,
        })
    }

    /// Share an interrupt flag (set from a Ctrl-C handler)
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Call `hook` with each step report as soon as the step ends
    #[must_use]
    pub fn with_progress(mut self, hook: impl Fn(&StepReport) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    fn interrupt_requested(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Run every selected step and write `run_summary.json`.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the interrupt flag is set before a step or
    /// while the last one runs. The summary of the finished steps is still
    /// written, marked as interrupted. Step failures are reported in the
    /// summary, not as errors.
    pub fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        info!(
            seed = self.config.seed,
            out = %self.config.output_dir.display(),
            steps = ?self.options.steps(),
            "study run started"
        );

        let mut summary = RunSummary {
            started_at,
            finished_at: started_at,
            seed: self.config.seed,
            output_dir: self.config.output_dir.clone(),
            options: self.options,
            steps: Vec::new(),
            key_statistics: None,
            verification: None,
            interrupted: false,
            tables_text: None,
        };
        let mut dataset: Option<TelemetryDataset> = None;
        let mut tables_written = false;

        for step in self.options.steps() {
            if self.interrupt_requested() {
                summary.interrupted = true;
                break;
            }
            let _span = info_span!("step", %step).entered();
            let clock = Instant::now();
            let (status, outputs) = match step {
                Step::Dataset => match self.dataset_step() {
                    Ok((ds, status, outputs)) => {
                        dataset = Some(ds);
                        (status, outputs)
                    }
                    Err(e) => (StepStatus::Failed(e.to_string()), Vec::new()),
                },
                _ => match &dataset {
                    None => (
                        StepStatus::Skipped("no dataset available".to_string()),
                        Vec::new(),
                    ),
                    Some(ds) => match step {
                        Step::Tables => {
                            let outcome = self.tables_step(ds, &mut summary);
                            tables_written = outcome.0 == StepStatus::Succeeded;
                            outcome
                        }
                        Step::Verify => self.verify_step(tables_written, &mut summary),
                        Step::Figures => self.figures_step(ds),
                        _ => self.mdf4_step(ds),
                    },
                },
            };

            match &status {
                StepStatus::Succeeded => info!(%step, "step succeeded"),
                StepStatus::Degraded(r) => warn!(%step, reason = %r, "step degraded"),
                StepStatus::Failed(r) => error!(%step, reason = %r, "step failed"),
                StepStatus::Skipped(r) => warn!(%step, reason = %r, "step skipped"),
            }
            summary.steps.push(StepReport {
                step,
                status,
                elapsed_ms: clock.elapsed().as_millis(),
                outputs,
            });
            if let (Some(hook), Some(report)) = (&self.progress, summary.steps.last()) {
                hook(report);
            }
        }
        summary.interrupted |= self.interrupt_requested();

        if let Some(ds) = &dataset {
            match KeyStatistics::from_dataset(ds) {
                Ok(k) => summary.key_statistics = Some(k),
                Err(e) => warn!(error = %e, "key statistics unavailable"),
            }
        }
        summary.finished_at = Utc::now();

        let path = self.config.output_dir.join(SUMMARY_FILE);
        if let Err(e) = summary.write_json(&path) {
            warn!(path = %path.display(), error = %e, "could not write run summary");
        }
        if summary.interrupted {
            warn!(completed = summary.steps.len(), "study run interrupted");
            return Err(Error::Interrupted);
        }
        info!(exit_code = summary.exit_code(), "study run finished");
        Ok(summary)
    }

    fn dataset_step(&self) -> Result<(TelemetryDataset, StepStatus, Vec<PathBuf>)> {
        let csv_path = self.config.dataset_csv_path();
        if self.options.load_existing {
            if !csv_path.is_file() {
                return Err(Error::InvalidInput(format!(
                    "{} not found; run with --data-only first",
                    csv_path.display()
                )));
            }
            let ds = read_csv(&csv_path)?;
            info!(path = %csv_path.display(), rows = ds.rows(), "existing dataset loaded");
            return Ok((ds, StepStatus::Succeeded, Vec::new()));
        }

        let ds = generate_dataset(&self.config)?;
        write_csv(&ds, &csv_path)?;
        let mut outputs = vec![csv_path];
        let mut status = StepStatus::Succeeded;

        if self.config.export_parquet {
            let parquet_path = self.config.dataset_parquet_path();
            match TelemetryStore::from_dataset(&ds).and_then(|s| s.write_parquet(&parquet_path)) {
                Ok(()) => outputs.push(parquet_path),
                Err(e) => status = StepStatus::Degraded(format!("Parquet export failed: {e}")),
            }
        }
        Ok((ds, status, outputs))
    }

    fn tables_step(&self, ds: &TelemetryDataset, summary: &mut RunSummary) -> StepOutcome {
        let result = StudyTables::compute(
            ds,
            self.config.samples_per_lap(),
            self.config.significance_level,
        )
        .and_then(|t| {
            let paths = t.write_csv(self.config.tables_dir())?;
            Ok((t, paths))
        });
        match result {
            Ok((tables, paths)) => {
                summary.tables_text = Some(tables.render_text());
                (StepStatus::Succeeded, paths)
            }
            Err(e) => (StepStatus::Degraded(e.to_string()), Vec::new()),
        }
    }

    fn verify_step(&self, with_tables: bool, summary: &mut RunSummary) -> StepOutcome {
        let mut verifier = Verifier::new(&self.config);
        if with_tables {
            verifier = verifier.with_tables_dir(self.config.tables_dir());
        }
        let report = verifier.verify(self.config.dataset_csv_path());
        let status = if report.is_ok() {
            StepStatus::Succeeded
        } else {
            StepStatus::Degraded(Error::VerificationFailed(report.errors()).to_string())
        };
        summary.verification = Some(report);
        (status, Vec::new())
    }

    fn figures_step(&self, ds: &TelemetryDataset) -> StepOutcome {
        let dir = self.config.figures_dir();
        let mut outputs = Vec::new();
        let mut failures = Vec::new();
        for spec in standard_figures() {
            match render_figure(&spec, ds, &dir, self.config.figure_dpi) {
                Ok(paths) => outputs.extend(paths),
                Err(e) => failures.push(format!("{}: {e}", spec.file_stem)),
            }
        }
        if failures.is_empty() {
            (StepStatus::Succeeded, outputs)
        } else {
            (StepStatus::Degraded(failures.join("; ")), outputs)
        }
    }

    fn mdf4_step(&self, ds: &TelemetryDataset) -> StepOutcome {
        let path = self.config.mdf4_path();
        let header = Mdf4Header::new(&self.config.mdf4, Utc::now());
        let result = write_mdf4(ds, &header, &path).and_then(|_| {
            let groups = Mdf4File::read(&path)?.groups().len();
            if groups == ds.frames().len() {
                Ok(())
            } else {
                Err(Error::Mdf4(format!("read back {groups} groups, wrote {}", ds.frames().len())))
            }
        });
        match result {
            Ok(()) => (StepStatus::Succeeded, vec![path]),
            Err(e) => (StepStatus::Failed(e.to_string()), Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn flags(f: impl FnOnce(&mut RunFlags)) -> RunOptions {
        let mut flags = RunFlags::default();
        f(&mut flags);
        RunOptions::from_flags(&flags)
    }

    #[test]
    fn test_default_is_dataset_tables_verify() {
        let o = flags(|_| {});
        assert_eq!(o.steps(), vec![Step::Dataset, Step::Tables, Step::Verify]);
        assert!(!o.load_existing);
    }

    #[test]
    fn test_data_only() {
        let o = flags(|f| f.data_only = true);
        assert_eq!(o.steps(), vec![Step::Dataset]);
    }

    #[test]
    fn test_tables_only_loads_existing_and_skips_verify() {
        let o = flags(|f| f.tables_only = true);
        assert_eq!(o.steps(), vec![Step::Dataset, Step::Tables]);
        assert!(o.load_existing);
    }

    #[test]
    fn test_full_runs_everything() {
        let o = flags(|f| f.full = true);
        assert_eq!(
            o.steps(),
            vec![Step::Dataset, Step::Tables, Step::Verify, Step::Figures, Step::Mdf4]
        );
    }

    #[test]
    fn test_skip_verify_and_extras() {
        let o = flags(|f| {
            f.skip_verify = true;
            f.with_mdf4 = true;
        });
        assert_eq!(o.steps(), vec![Step::Dataset, Step::Tables, Step::Mdf4]);

        let o = flags(|f| {
            f.data_only = true;
            f.with_figures = true;
        });
        assert_eq!(o.steps(), vec![Step::Dataset, Step::Figures]);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&StepStatus::Degraded("x".to_string())).unwrap();
        assert_eq!(json, r#"{"status":"degraded","reason":"x"}"#);
        let json = serde_json::to_string(&StepStatus::Succeeded).unwrap();
        assert_eq!(json, r#"{"status":"succeeded"}"#);
    }

    fn small_config(dir: &Path) -> StudyConfig {
        StudyConfig::builder()
            .seed(4)
            .laps_per_setup(2)
            .expected_rows(4_000)
            .export_parquet(false)
            .output_dir(dir)
            .build()
    }

    #[test]
    fn test_interrupt_before_first_step() {
        let dir = TempDir::new().unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let pipeline = Pipeline::new(small_config(dir.path()), flags(|_| {}))
            .unwrap()
            .with_interrupt(flag);
        assert!(matches!(pipeline.run(), Err(Error::Interrupted)));

        let json = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(json["interrupted"], true);
        assert_eq!(json["steps"].as_array().unwrap().len(), 0);
    }

    fn interrupt_after(step: Step, flag: &Arc<AtomicBool>) -> impl Fn(&StepReport) + Send + Sync {
        let flag = Arc::clone(flag);
        move |report: &StepReport| {
            if report.step == step {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_interrupt_during_last_step_is_reported() {
        let dir = TempDir::new().unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::new(small_config(dir.path()), flags(|f| f.data_only = true))
            .unwrap()
            .with_interrupt(Arc::clone(&flag))
            .with_progress(interrupt_after(Step::Dataset, &flag));
        assert!(matches!(pipeline.run(), Err(Error::Interrupted)));

        let json = std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(json["interrupted"], true);
        assert_eq!(json["steps"][0]["step"], "dataset");
    }

    #[test]
    fn test_interrupt_mid_run_stops_remaining_steps() {
        let dir = TempDir::new().unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::new(small_config(dir.path()), flags(|_| {}))
            .unwrap()
            .with_interrupt(Arc::clone(&flag))
            .with_progress(interrupt_after(Step::Dataset, &flag));
        assert!(matches!(pipeline.run(), Err(Error::Interrupted)));
        assert!(!small_config(dir.path()).tables_dir().exists());
    }

    #[test]
    fn test_tables_only_without_dataset_fails_and_skips() {
        let dir = TempDir::new().unwrap();
        let pipeline =
            Pipeline::new(small_config(dir.path()), flags(|f| f.tables_only = true)).unwrap();
        let summary = pipeline.run().unwrap();
        assert!(matches!(
            summary.step(Step::Dataset).unwrap().status,
            StepStatus::Failed(_)
        ));
        assert!(matches!(
            summary.step(Step::Tables).unwrap().status,
            StepStatus::Skipped(_)
        ));
        assert_eq!(summary.exit_code(), 1);
        assert!(dir.path().join(SUMMARY_FILE).is_file());
    }

    #[test]
    fn test_default_run_succeeds() {
        let dir = TempDir::new().unwrap();
        let config = small_config(dir.path());
        let summary = Pipeline::new(config.clone(), flags(|_| {}))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(summary.exit_code(), 0, "{}", summary.render());
        assert!(config.dataset_csv_path().is_file());
        assert!(config.tables_dir().join("Table_v4_All_Metrics.csv").is_file());
        assert!(summary.verification.as_ref().unwrap().is_ok());
        let k = summary.key_statistics.unwrap();
        assert!(k.sigma_optimized_mean < k.sigma_baseline_mean);
        assert!(summary.tables_text.unwrap().contains("CORE METRICS"));
    }
}
