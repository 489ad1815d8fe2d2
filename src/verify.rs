//! Dataset verifier
//!
//! Re-reads a telemetry CSV from disk and checks it against the study
//! constants. Checks come in two severities:
//!
//! - **Critical**: the file is unusable or the headline result does not hold
//! - **Warning**: something is off but the dataset can still be analysed
//!
//! [`VerificationReport::is_ok`] is true when no critical check failed.

use crate::config::StudyConfig;
use crate::report::{sci, STATISTICAL_TESTS_FILE};
use crate::stats;
use crate::storage::{csv_bytes, read_table, RawTable};
use crate::telemetry::channels::SETUP_COLUMN;
use crate::telemetry::{generate_dataset, Channel, Setup};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Allowed |Δt| between recomputed and tabulated Welch t
pub const WELCH_T_TOLERANCE: f64 = 0.5;
/// Allowed |Δd| between recomputed and tabulated Cohen's d
pub const COHENS_D_TOLERANCE: f64 = 0.01;
/// Allowed |ΔD| between recomputed and tabulated KS statistic
pub const KS_D_TOLERANCE: f64 = 0.01;
/// Speed above which a sample counts as on track (km/h)
pub const ACTIVE_SPEED_KMH: f64 = 1.0;

/// How much a failing check matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Failure makes the dataset unusable
    Critical,
    /// Failure is reported but tolerated
    Warning,
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Check passed
    Pass,
    /// Warning-level check failed
    Warn,
    /// Critical check failed
    Error,
}

/// One verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    /// Short check name
    pub name: String,
    /// Severity if it fails
    pub severity: Severity,
    /// Whether it passed
    pub passed: bool,
    /// What was observed
    pub detail: String,
}

impl Check {
    fn new(name: &str, severity: Severity, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            severity,
            passed,
            detail: detail.into(),
        }
    }

    /// Pass, warn or error
    #[must_use]
    pub const fn status(&self) -> CheckStatus {
        match (self.passed, self.severity) {
            (true, _) => CheckStatus::Pass,
            (false, Severity::Warning) => CheckStatus::Warn,
            (false, Severity::Critical) => CheckStatus::Error,
        }
    }
}

/// Every check run against one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    /// Verified file
    pub path: PathBuf,
    /// Checks in the order they ran
    pub checks: Vec<Check>,
}

impl VerificationReport {
    /// True when no critical check failed
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors() == 0
    }

    /// Failed critical checks
    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(CheckStatus::Error)
    }

    /// Failed warning checks
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status() == status).count()
    }

    /// Look up a check by name
    #[must_use]
    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// Human-readable report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Verifying {}", self.path.display());
        for c in &self.checks {
            let tag = match c.status() {
                CheckStatus::Pass => "PASS",
                CheckStatus::Warn => "WARN",
                CheckStatus::Error => "FAIL",
            };
            let _ = writeln!(out, "  [{tag}] {:<24} {}", c.name, c.detail);
        }
        let verdict = if self.is_ok() { "OK" } else { "FAILED" };
        let _ = writeln!(
            out,
            "Result: {verdict} ({} error(s), {} warning(s))",
            self.errors(),
            self.warnings()
        );
        out
    }
}

/// Verifies telemetry CSV files against a study configuration.
#[derive(Debug, Clone)]
pub struct Verifier<'a> {
    config: &'a StudyConfig,
    tables_dir: Option<PathBuf>,
    check_reproducibility: bool,
}

impl<'a> Verifier<'a> {
    /// Verifier with reproducibility on and no table cross-check
    #[must_use]
    pub const fn new(config: &'a StudyConfig) -> Self {
        Self {
            config,
            tables_dir: None,
            check_reproducibility: true,
        }
    }

    /// Cross-check against `Table_v4_Statistical_Tests.csv` in `dir`
    #[must_use]
    pub fn with_tables_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tables_dir = Some(dir.into());
        self
    }

    /// Enable or disable the regeneration check
    #[must_use]
    pub const fn check_reproducibility(mut self, enabled: bool) -> Self {
        self.check_reproducibility = enabled;
        self
    }

    /// Run every check on `path`.
    ///
    /// Never fails: unreadable input is reported as a critical check.
    #[must_use]
    pub fn verify<P: AsRef<Path>>(&self, path: P) -> VerificationReport {
        let path = path.as_ref();
        let mut checks = Vec::new();

        let exists = path.is_file();
        checks.push(Check::new(
            "file exists",
            Severity::Critical,
            exists,
            if exists { "found" } else { "not found" },
        ));
        if exists {
            match read_table(path) {
                Ok(table) => {
                    checks.push(Check::new(
                        "csv readable",
                        Severity::Critical,
                        true,
                        format!("{} rows x {} columns", table.num_rows(), table.num_columns()),
                    ));
                    self.table_checks(path, &table, &mut checks);
                }
                Err(e) => checks.push(Check::new(
                    "csv readable",
                    Severity::Critical,
                    false,
                    e.to_string(),
                )),
            }
        }

        let report = VerificationReport {
            path: path.to_path_buf(),
            checks,
        };
        if report.is_ok() {
            info!(path = %path.display(), warnings = report.warnings(), "dataset verified");
        } else {
            warn!(path = %path.display(), errors = report.errors(), "dataset verification failed");
        }
        report
    }

    fn table_checks(&self, path: &Path, table: &RawTable, checks: &mut Vec<Check>) {
        let numeric = table.numeric_columns().len();
        checks.push(Check::new(
            "channel count",
            Severity::Critical,
            numeric >= self.config.expected_channels,
            format!(
                "{numeric} numeric columns (expected >= {})",
                self.config.expected_channels
            ),
        ));

        let (missing, nan) = (table.missing_cells(), table.nan_cells());
        checks.push(Check::new(
            "no missing values",
            Severity::Critical,
            missing == 0 && nan == 0,
            format!("{missing} empty, {nan} NaN"),
        ));

        let rows = table.num_rows();
        checks.push(Check::new(
            "row count",
            Severity::Warning,
            rows >= self.config.expected_rows,
            format!("{rows} rows (expected >= {})", self.config.expected_rows),
        ));

        checks.push(balance_check(table));
        checks.push(bounds_check(table));

        let sigma = |setup: Setup| {
            table.numeric_column_where(Channel::Volatility.name(), SETUP_COLUMN, setup.label())
        };
        match (sigma(Setup::Baseline), sigma(Setup::Optimized)) {
            (Ok(b), Ok(o)) => {
                checks.push(match stats::welch_t_test(&b, &o) {
                    Ok(r) => Check::new(
                        "sigma significance",
                        Severity::Critical,
                        r.p_value < self.config.significance_level,
                        format!(
                            "Welch t = {:.4}, p = {} (alpha {})",
                            r.statistic,
                            sci(r.p_value),
                            self.config.significance_level
                        ),
                    ),
                    Err(e) => Check::new(
                        "sigma significance",
                        Severity::Critical,
                        false,
                        e.to_string(),
                    ),
                });
                let (mb, mo) = (stats::mean(&b), stats::mean(&o));
                checks.push(Check::new(
                    "sigma reduced",
                    Severity::Warning,
                    mo < mb,
                    format!("baseline {mb:.4}, optimized {mo:.4}"),
                ));
            }
            (Err(e), _) | (_, Err(e)) => {
                checks.push(Check::new(
                    "sigma significance",
                    Severity::Critical,
                    false,
                    e.to_string(),
                ));
            }
        }

        if self.check_reproducibility {
            checks.push(self.reproducibility_check(path));
        }
        if let Some(dir) = &self.tables_dir {
            checks.push(cross_check(table, &dir.join(STATISTICAL_TESTS_FILE)));
        }
    }

    fn reproducibility_check(&self, path: &Path) -> Check {
        let result = generate_dataset(self.config)
            .and_then(|ds| csv_bytes(&ds))
            .and_then(|fresh| Ok((fresh, std::fs::read(path)?)));
        match result {
            Ok((fresh, on_disk)) => {
                let same = fresh == on_disk;
                Check::new(
                    "reproducible",
                    Severity::Warning,
                    same,
                    if same {
                        format!("seed {} regenerates identical bytes", self.config.seed)
                    } else {
                        format!("seed {} regenerates different bytes", self.config.seed)
                    },
                )
            }
            Err(e) => Check::new("reproducible", Severity::Warning, false, e.to_string()),
        }
    }
}

fn balance_check(table: &RawTable) -> Check {
    let Some(labels) = table.cells(SETUP_COLUMN) else {
        return Check::new("setups balanced", Severity::Warning, false, "no setup column");
    };
    let count = |s: Setup| labels.iter().filter(|l| l.trim() == s.label()).count();
    let (b, o) = (count(Setup::Baseline), count(Setup::Optimized));
    Check::new(
        "setups balanced",
        Severity::Warning,
        b > 0 && b == o,
        format!("baseline {b}, optimized {o}"),
    )
}

fn bounds_check(table: &RawTable) -> Check {
    let mut violations = Vec::new();
    for channel in Channel::ALL {
        let Some((lo, hi)) = channel.bounds() else {
            continue;
        };
        let Ok(values) = table.numeric_column(channel.name()) else {
            violations.push(format!("{channel} unreadable"));
            continue;
        };
        let out = values.iter().filter(|v| **v < lo || **v > hi).count();
        if out > 0 {
            violations.push(format!("{channel}: {out} outside [{lo}, {hi}]"));
        }
    }
    Check::new(
        "clip bounds",
        Severity::Warning,
        violations.is_empty(),
        if violations.is_empty() {
            "all clipped channels in range".to_string()
        } else {
            violations.join("; ")
        },
    )
}

fn tabulated(tests: &RawTable, name: &str) -> Option<f64> {
    let names = tests.cells("Test")?;
    let stats = tests.cells("Statistic")?;
    let idx = names.iter().position(|n| *n == name)?;
    stats.get(idx)?.trim().parse().ok()
}

fn cross_check(table: &RawTable, tests_path: &Path) -> Check {
    const NAME: &str = "table cross-check";
    let tests = match read_table(tests_path) {
        Ok(t) => t,
        Err(e) => return Check::new(NAME, Severity::Warning, false, e.to_string()),
    };

    let active = |setup: Setup| -> crate::Result<Vec<f64>> {
        let speed =
            table.numeric_column_where(Channel::Speed.name(), SETUP_COLUMN, setup.label())?;
        let sigma =
            table.numeric_column_where(Channel::Volatility.name(), SETUP_COLUMN, setup.label())?;
        Ok(sigma
            .into_iter()
            .zip(speed)
            .filter_map(|(s, v)| (v > ACTIVE_SPEED_KMH).then_some(s))
            .collect())
    };
    let recomputed = active(Setup::Baseline).and_then(|b| {
        let o = active(Setup::Optimized)?;
        Ok((
            stats::welch_t_test(&b, &o)?.statistic,
            stats::cohens_d(&b, &o)?,
            stats::ks_two_sample(&b, &o)?.statistic,
        ))
    });
    let (t, d, ks) = match recomputed {
        Ok(v) => v,
        Err(e) => return Check::new(NAME, Severity::Warning, false, e.to_string()),
    };

    let mut mismatches = Vec::new();
    for (test, value, tol) in [
        ("Welch t-test", t, WELCH_T_TOLERANCE),
        ("Cohen d", d, COHENS_D_TOLERANCE),
        ("KS Test", ks, KS_D_TOLERANCE),
    ] {
        match tabulated(&tests, test) {
            Some(expected) if (expected - value).abs() < tol => {}
            Some(expected) => {
                mismatches.push(format!("{test}: table {expected:.4}, recomputed {value:.4}"));
            }
            None => mismatches.push(format!("{test}: missing from table")),
        }
    }
    Check::new(
        NAME,
        Severity::Warning,
        mismatches.is_empty(),
        if mismatches.is_empty() {
            format!("t {t:.4}, d {d:.4}, D {ks:.4} match")
        } else {
            mismatches.join("; ")
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::StudyTables;
    use crate::storage::write_csv;
    use tempfile::TempDir;

    fn small_config() -> StudyConfig {
        StudyConfig::builder()
            .seed(11)
            .laps_per_setup(2)
            .expected_rows(4_000)
            .build()
    }

    #[test]
    fn test_missing_file_is_critical() {
        let config = small_config();
        let report = Verifier::new(&config).verify("/nonexistent/telemetry.csv");
        assert!(!report.is_ok());
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].status(), CheckStatus::Error);
    }

    #[test]
    fn test_generated_dataset_passes() {
        let config = small_config();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.csv");
        let ds = generate_dataset(&config).unwrap();
        write_csv(&ds, &path).unwrap();
        StudyTables::compute(&ds, config.samples_per_lap(), 0.05)
            .unwrap()
            .write_csv(dir.path())
            .unwrap();

        let report = Verifier::new(&config).with_tables_dir(dir.path()).verify(&path);
        assert!(report.is_ok(), "{}", report.render());
        assert_eq!(report.warnings(), 0, "{}", report.render());
        assert!(report.check("reproducible").unwrap().passed);
        assert!(report.check("table cross-check").unwrap().passed);
    }

    #[test]
    fn test_row_count_shortfall_is_warning() {
        let config = small_config();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.csv");
        write_csv(&generate_dataset(&config).unwrap(), &path).unwrap();

        let strict = StudyConfig {
            expected_rows: 20_000,
            ..config
        };
        let report = Verifier::new(&strict).verify(&path);
        assert!(report.is_ok());
        assert_eq!(report.check("row count").unwrap().status(), CheckStatus::Warn);
    }

    #[test]
    fn test_different_seed_not_reproducible() {
        let config = small_config();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.csv");
        write_csv(&generate_dataset(&config).unwrap(), &path).unwrap();

        let other = StudyConfig { seed: 12, ..config };
        let report = Verifier::new(&other).verify(&path);
        assert!(report.is_ok());
        assert!(!report.check("reproducible").unwrap().passed);
    }

    #[test]
    fn test_nan_cell_is_critical() {
        let config = small_config();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.csv");
        write_csv(&generate_dataset(&config).unwrap(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let mut cells: Vec<&str> = lines[1].split(',').collect();
        cells[5] = "NaN";
        lines[1] = cells.join(",");
        std::fs::write(&path, lines.join("\n")).unwrap();

        let report = Verifier::new(&config).check_reproducibility(false).verify(&path);
        assert!(!report.is_ok());
        assert_eq!(
            report.check("no missing values").unwrap().status(),
            CheckStatus::Error
        );
        assert!(report.render().contains("FAILED"));
    }
}
