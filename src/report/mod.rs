//! Metric tables for the baseline vs optimized comparison
//!
//! [`StudyTables::compute`] derives every table from a dataset;
//! [`StudyTables::write_csv`] exports them and
//! [`StudyTables::render_text`] formats the console version.
//!
//! Output files (in the tables directory):
//! - `Table_v4_All_Metrics.csv`
//! - `Table_v4_Glicko_Summary.csv`
//! - `Table_v4_Statistical_Tests.csv`
//! - `Table_v4_Sample_Characteristics.csv`
//! - `Turns_Analysis_v4.csv`

pub mod turns;

pub use turns::{turn_analysis, TurnRow};

use crate::stats::{self, interpret, Summary, TestResult};
use crate::storage::write_rows;
use crate::telemetry::{Channel, Setup, TelemetryDataset};
use crate::{Error, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// All-metrics table file name
pub const ALL_METRICS_FILE: &str = "Table_v4_All_Metrics.csv";
/// σ summary table file name
pub const GLICKO_SUMMARY_FILE: &str = "Table_v4_Glicko_Summary.csv";
/// Hypothesis test table file name
pub const STATISTICAL_TESTS_FILE: &str = "Table_v4_Statistical_Tests.csv";
/// Sample characteristics table file name
pub const SAMPLE_CHARACTERISTICS_FILE: &str = "Table_v4_Sample_Characteristics.csv";
/// Per-turn table file name
pub const TURNS_FILE: &str = "Turns_Analysis_v4.csv";

/// Relative reduction `(b − o) / b · 100`, 0 when `b` is 0.
#[must_use]
pub fn improvement_pct(baseline: f64, optimized: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (baseline - optimized) / baseline * 100.0
    }
}

/// Scientific notation with two mantissa decimals and a signed two-digit
/// exponent, e.g. `1.23e-05`.
#[must_use]
pub fn sci(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let raw = format!("{value:.2e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => raw,
    }
}

/// How a metric reduces a channel column.
#[derive(Debug, Clone, Copy)]
enum Agg {
    Mean,
    Max,
    Std,
    Percent,
}

impl Agg {
    fn apply(self, values: &[f64]) -> f64 {
        match self {
            Self::Mean => stats::mean(values),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Std => stats::std_dev(values),
            Self::Percent => stats::mean(values) * 100.0,
        }
    }
}

/// `(group, label, channel, aggregation)` of every comparison metric
const METRICS: [(&str, &str, Channel, Agg); 25] = [
    ("Core", "RPM Mean", Channel::EngineRpm, Agg::Mean),
    ("Core", "RPM Max", Channel::EngineRpm, Agg::Max),
    ("Core", "RPM Std Dev", Channel::EngineRpm, Agg::Std),
    ("Core", "Torque Mean (Nm)", Channel::EngineTorque, Agg::Mean),
    ("Core", "Speed Mean (km/h)", Channel::Speed, Agg::Mean),
    ("Core", "Speed Max (km/h)", Channel::Speed, Agg::Max),
    ("Core", "Throttle Mean (%)", Channel::Throttle, Agg::Percent),
    ("Core", "Gear Mean", Channel::Gear, Agg::Mean),
    ("Dynamics", "Longitudinal Accel (g)", Channel::AccelLon, Agg::Mean),
    ("Dynamics", "Lateral Accel (g)", Channel::AccelLat, Agg::Mean),
    ("Dynamics", "Vertical Accel (g)", Channel::AccelVert, Agg::Mean),
    ("Dynamics", "Wheel Slip (%)", Channel::WheelSlip, Agg::Mean),
    ("Dynamics", "Brake Pressure (bar)", Channel::BrakePressure, Agg::Mean),
    ("Dynamics", "Brake Temp (°C)", Channel::BrakeTemperature, Agg::Mean),
    ("Dynamics", "Brake Balance (%)", Channel::BrakeBalance, Agg::Mean),
    ("Chassis", "Tire Temp FL (°C)", Channel::TireTempFl, Agg::Mean),
    ("Chassis", "Tire Pressure FL (bar)", Channel::TirePressureFl, Agg::Mean),
    ("Chassis", "Susp Travel FL (mm)", Channel::SuspensionFl, Agg::Mean),
    ("Chassis", "Susp Travel RL (mm)", Channel::SuspensionRl, Agg::Mean),
    ("Aero", "Aero Downforce (N)", Channel::AeroDownforce, Agg::Mean),
    ("Aero", "Aero Drag (N)", Channel::AeroDrag, Agg::Mean),
    ("Aero", "Gear Ratio Efficiency (%)", Channel::GearRatioEfficiency, Agg::Mean),
    ("Aero", "Engine Efficiency (%)", Channel::EngineEfficiency, Agg::Mean),
    ("Aero", "Battery Voltage (V)", Channel::BatteryVoltage, Agg::Mean),
    ("Aero", "Battery Current (A)", Channel::BatteryCurrent, Agg::Mean),
];

/// One baseline vs optimized comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    /// Metric group
    #[serde(rename = "Table")]
    pub table: &'static str,
    /// Metric label
    #[serde(rename = "Metric")]
    pub metric: &'static str,
    /// Baseline value
    #[serde(rename = "Baseline")]
    pub baseline: f64,
    /// Optimized value
    #[serde(rename = "Optimized")]
    pub optimized: f64,
    /// Relative reduction (%)
    #[serde(rename = "Improvement_%")]
    pub improvement_pct: f64,
}

/// One σ summary statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SigmaSummaryRow {
    /// Statistic label
    #[serde(rename = "Metric")]
    pub metric: &'static str,
    /// Baseline value
    #[serde(rename = "Baseline")]
    pub baseline: f64,
    /// Optimized value
    #[serde(rename = "Optimized")]
    pub optimized: f64,
    /// Relative reduction (%)
    #[serde(rename = "Improvement (%)")]
    pub improvement_pct: f64,
}

/// One hypothesis test on σ.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatTestRow {
    /// Test name
    #[serde(rename = "Test")]
    pub test: &'static str,
    /// Statistic, 4 decimals
    #[serde(rename = "Statistic")]
    pub statistic: String,
    /// p-value in scientific notation, or `N/A`
    #[serde(rename = "p-value")]
    pub p_value: String,
    /// Verdict derived from the values
    #[serde(rename = "Result")]
    pub result: &'static str,
}

/// One sample characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacteristicRow {
    /// Characteristic label
    #[serde(rename = "Characteristic")]
    pub characteristic: &'static str,
    /// Baseline value
    #[serde(rename = "Baseline")]
    pub baseline: String,
    /// Optimized value
    #[serde(rename = "Optimized")]
    pub optimized: String,
}

/// σ hypothesis tests in raw form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SigmaTests {
    /// Welch's t-test
    pub welch: TestResult,
    /// Cohen's d
    pub cohens_d: f64,
    /// Levene (median-centred)
    pub levene: TestResult,
    /// Two-sample Kolmogorov–Smirnov
    pub ks: TestResult,
}

impl SigmaTests {
    /// Run all four tests, baseline as the first sample.
    ///
    /// # Errors
    ///
    /// Returns error if a test is undefined for the samples.
    pub fn run(baseline: &[f64], optimized: &[f64]) -> Result<Self> {
        Ok(Self {
            welch: stats::welch_t_test(baseline, optimized)?,
            cohens_d: stats::cohens_d(baseline, optimized)?,
            levene: stats::levene_test(baseline, optimized)?,
            ks: stats::ks_two_sample(baseline, optimized)?,
        })
    }

    /// Table rows with formatted values and verdicts.
    #[must_use]
    pub fn rows(&self, alpha: f64) -> Vec<StatTestRow> {
        vec![
            StatTestRow {
                test: "Welch t-test",
                statistic: format!("{:.4}", self.welch.statistic),
                p_value: sci(self.welch.p_value),
                result: interpret::significance(self.welch.p_value, alpha),
            },
            StatTestRow {
                test: "Cohen d",
                statistic: format!("{:.4}", self.cohens_d),
                p_value: "N/A".to_string(),
                result: interpret::effect_size(self.cohens_d),
            },
            StatTestRow {
                test: "Levene Test",
                statistic: format!("{:.4}", self.levene.statistic),
                p_value: sci(self.levene.p_value),
                result: interpret::variance_equality(self.levene.p_value, alpha),
            },
            StatTestRow {
                test: "KS Test",
                statistic: format!("{:.4}", self.ks.statistic),
                p_value: sci(self.ks.p_value),
                result: interpret::distribution_equality(self.ks.p_value, alpha),
            },
        ]
    }
}

/// Headline numbers of a study, for the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyStatistics {
    /// Baseline mean σ
    pub sigma_baseline_mean: f64,
    /// Optimized mean σ
    pub sigma_optimized_mean: f64,
    /// Relative σ reduction (%)
    pub sigma_improvement_pct: f64,
    /// Welch t statistic
    pub welch_t: f64,
    /// Welch p-value
    pub welch_p: f64,
    /// Cohen's d
    pub cohens_d: f64,
    /// Engine efficiency gain (percentage points, optimized − baseline)
    pub engine_efficiency_delta: f64,
    /// Wheel slip change (percentage points, optimized − baseline)
    pub wheel_slip_delta: f64,
}

impl KeyStatistics {
    /// Compute the headline numbers.
    ///
    /// # Errors
    ///
    /// Returns error if the σ tests are undefined.
    pub fn from_dataset(dataset: &TelemetryDataset) -> Result<Self> {
        let b = dataset.column(Setup::Baseline, Channel::Volatility);
        let o = dataset.column(Setup::Optimized, Channel::Volatility);
        let welch = stats::welch_t_test(b, o)?;
        let delta = |c: Channel| {
            stats::mean(dataset.column(Setup::Optimized, c))
                - stats::mean(dataset.column(Setup::Baseline, c))
        };
        let (mb, mo) = (stats::mean(b), stats::mean(o));
        Ok(Self {
            sigma_baseline_mean: mb,
            sigma_optimized_mean: mo,
            sigma_improvement_pct: improvement_pct(mb, mo),
            welch_t: welch.statistic,
            welch_p: welch.p_value,
            cohens_d: stats::cohens_d(b, o)?,
            engine_efficiency_delta: delta(Channel::EngineEfficiency),
            wheel_slip_delta: delta(Channel::WheelSlip),
        })
    }
}

/// Every table of the study.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyTables {
    /// Core, Dynamics, Chassis and Aero comparisons
    pub metrics: Vec<MetricRow>,
    /// σ summary statistics
    pub sigma_summary: Vec<SigmaSummaryRow>,
    /// σ hypothesis tests (raw)
    pub sigma_tests: SigmaTests,
    /// σ hypothesis tests (formatted)
    pub tests: Vec<StatTestRow>,
    /// Sample characteristics
    pub samples: Vec<CharacteristicRow>,
    /// Per-turn means
    pub turns: Vec<TurnRow>,
}

fn sample_characteristics(dataset: &TelemetryDataset) -> Vec<CharacteristicRow> {
    let per_setup = |f: &dyn Fn(Setup) -> String| (f(Setup::Baseline), f(Setup::Optimized));
    let row = |characteristic: &'static str, (baseline, optimized): (String, String)| {
        CharacteristicRow {
            characteristic,
            baseline,
            optimized,
        }
    };
    vec![
        row(
            "Sample Size",
            per_setup(&|s| dataset.frame(s).len().to_string()),
        ),
        row(
            "Duration (seconds)",
            per_setup(&|s| {
                let t = dataset.column(s, Channel::Time);
                let max = t.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let min = t.iter().copied().fold(f64::INFINITY, f64::min);
                format!("{:.2}", max - min)
            }),
        ),
        row(
            "Missing Values",
            per_setup(&|s| {
                Channel::ALL
                    .iter()
                    .map(|&c| dataset.column(s, c).iter().filter(|v| v.is_nan()).count())
                    .sum::<usize>()
                    .to_string()
            }),
        ),
        row(
            "Numeric Channels",
            per_setup(&|_| Channel::COUNT.to_string()),
        ),
        row(
            "Total Columns",
            per_setup(&|_| (Channel::COUNT + 2).to_string()),
        ),
    ]
}

impl StudyTables {
    /// Compute every table.
    ///
    /// # Errors
    ///
    /// - `InsufficientData` if a setup has fewer than 2 samples
    /// - `InvalidInput` if the σ tests are undefined
    pub fn compute(dataset: &TelemetryDataset, samples_per_lap: usize, alpha: f64) -> Result<Self> {
        for setup in Setup::ALL {
            let n = dataset.frame(setup).len();
            if n < 2 {
                return Err(Error::InsufficientData {
                    what: format!("{setup} tables"),
                    needed: 2,
                    got: n,
                });
            }
        }

        let metrics = METRICS
            .iter()
            .map(|&(table, metric, channel, agg)| {
                let baseline = agg.apply(dataset.column(Setup::Baseline, channel));
                let optimized = agg.apply(dataset.column(Setup::Optimized, channel));
                MetricRow {
                    table,
                    metric,
                    baseline,
                    optimized,
                    improvement_pct: improvement_pct(baseline, optimized),
                }
            })
            .collect();

        let sb = dataset.column(Setup::Baseline, Channel::Volatility);
        let so = dataset.column(Setup::Optimized, Channel::Volatility);
        let (b, o) = (Summary::of(sb)?, Summary::of(so)?);
        let sigma_summary = [
            ("σ Mean (volatility)", b.mean, o.mean),
            ("σ Std Dev", b.std, o.std),
            ("σ Max", b.max, o.max),
            ("σ Min", b.min, o.min),
            ("σ Median", b.median, o.median),
            ("σ Q1 (25%)", b.q1, o.q1),
            ("σ Q3 (75%)", b.q3, o.q3),
        ]
        .into_iter()
        .map(|(metric, baseline, optimized)| SigmaSummaryRow {
            metric,
            baseline,
            optimized,
            improvement_pct: improvement_pct(baseline, optimized),
        })
        .collect();

        let sigma_tests = SigmaTests::run(sb, so)?;
        let tables = Self {
            metrics,
            sigma_summary,
            tests: sigma_tests.rows(alpha),
            sigma_tests,
            samples: sample_characteristics(dataset),
            turns: turn_analysis(dataset, samples_per_lap),
        };
        debug!(
            metrics = tables.metrics.len(),
            turns = tables.turns.len(),
            "tables computed"
        );
        Ok(tables)
    }

    /// Write every table into `dir`, returning the written paths.
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be written.
    pub fn write_csv<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let paths = vec![
            write_rows(&dir.join(ALL_METRICS_FILE), &self.metrics)?,
            write_rows(&dir.join(GLICKO_SUMMARY_FILE), &self.sigma_summary)?,
            write_rows(&dir.join(STATISTICAL_TESTS_FILE), &self.tests)?,
            write_rows(&dir.join(SAMPLE_CHARACTERISTICS_FILE), &self.samples)?,
            write_rows(&dir.join(TURNS_FILE), &self.turns)?,
        ];
        info!(dir = %dir.display(), files = paths.len(), "tables written");
        Ok(paths)
    }

    /// Fixed-width console rendering of every table.
    #[must_use]
    pub fn render_text(&self) -> String {
        let rule = "-".repeat(100);
        let mut out = String::new();

        for group in ["Core", "Dynamics", "Chassis", "Aero"] {
            let _ = writeln!(out, "\n{} METRICS", group.to_uppercase());
            let _ = writeln!(out, "{rule}");
            let _ = writeln!(
                out,
                "{:<30} | {:>15} | {:>15} | {:>15}",
                "Metric", "Baseline", "Optimized", "Improvement"
            );
            let _ = writeln!(out, "{rule}");
            for m in self.metrics.iter().filter(|m| m.table == group) {
                let _ = writeln!(
                    out,
                    "{:<30} | {:>15.2} | {:>15.2} | {:>+14.1}%",
                    m.metric, m.baseline, m.optimized, m.improvement_pct
                );
            }
        }

        let _ = writeln!(out, "\nVOLATILITY σ (PRIMARY OUTCOME)");
        let _ = writeln!(out, "{rule}");
        for s in &self.sigma_summary {
            let _ = writeln!(
                out,
                "{:<30} | {:>15.4} | {:>15.4} | {:>+14.1}%",
                s.metric, s.baseline, s.optimized, s.improvement_pct
            );
        }

        let _ = writeln!(out, "\nHYPOTHESIS TESTS ON σ");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "{:<28} | {:>15} | {:>14} | Interpretation",
            "Test", "Statistic", "p-value"
        );
        for t in &self.tests {
            let _ = writeln!(
                out,
                "{:<28} | {:>15} | {:>14} | {}",
                t.test, t.statistic, t.p_value, t.result
            );
        }

        let _ = writeln!(out, "\nSAMPLE CHARACTERISTICS");
        let _ = writeln!(out, "{rule}");
        for c in &self.samples {
            let _ = writeln!(
                out,
                "{:<30} | {:>15} | {:>15}",
                c.characteristic, c.baseline, c.optimized
            );
        }

        let _ = writeln!(out, "\nPER-TURN ANALYSIS");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "{:<9} {:<10} {:<10} | {:>9} | {:>7} | {:>6} | {:>7} | {:>7} | {:>6}",
            "Turn", "Name", "Setup", "RPM", "Speed", "Lat g", "Tire °C", "σ", "Eff %"
        );
        for r in &self.turns {
            let _ = writeln!(
                out,
                "{:<9} {:<10} {:<10} | {:>9.0} | {:>7.1} | {:>6.3} | {:>7.1} | {:>7.4} | {:>6.2}",
                r.turn,
                r.name,
                r.setup,
                r.rpm_mean,
                r.speed_mean,
                r.accel_lat_mean,
                r.tire_temp_mean,
                r.glicko_sigma_mean,
                r.engine_efficiency_mean
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StudyConfig;
    use crate::storage::read_table;
    use crate::telemetry::generate_dataset;
    use tempfile::TempDir;

    fn tables() -> (StudyTables, TelemetryDataset) {
        let config = StudyConfig::builder().seed(21).laps_per_setup(2).build();
        let ds = generate_dataset(&config).unwrap();
        let tables = StudyTables::compute(&ds, config.samples_per_lap(), 0.05).unwrap();
        (tables, ds)
    }

    #[test]
    fn test_improvement_pct() {
        assert!((improvement_pct(200.0, 150.0) - 25.0).abs() < 1e-12);
        assert!((improvement_pct(100.0, 110.0) + 10.0).abs() < 1e-12);
        assert!(improvement_pct(0.0, 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sci_pads_exponent() {
        assert_eq!(sci(1.23e-5), "1.23e-05");
        assert_eq!(sci(4.5e-120), "4.50e-120");
        assert_eq!(sci(0.5), "5.00e-01");
        assert_eq!(sci(12.0), "1.20e+01");
        assert_eq!(sci(0.0), "0.00e+00");
        assert_eq!(sci("1.23e-05".parse::<f64>().unwrap()), "1.23e-05");
    }

    #[test]
    fn test_p_values_use_padded_exponent() {
        let (t, _) = tables();
        for row in t.tests.iter().filter(|r| r.p_value != "N/A") {
            let (_, exp) = row.p_value.split_once('e').unwrap();
            assert!(exp.starts_with('-') || exp.starts_with('+'), "{}", row.p_value);
            assert!(exp.len() >= 3, "{}", row.p_value);
            assert!(row.p_value.parse::<f64>().is_ok());
        }
    }

    #[test]
    fn test_metric_groups() {
        let (t, _) = tables();
        assert_eq!(t.metrics.len(), 25);
        let count = |g: &str| t.metrics.iter().filter(|m| m.table == g).count();
        assert_eq!(
            (count("Core"), count("Dynamics"), count("Chassis"), count("Aero")),
            (8, 7, 4, 6)
        );
        let rpm = &t.metrics[0];
        assert_eq!(rpm.metric, "RPM Mean");
        assert!(rpm.optimized < rpm.baseline);
        assert!(rpm.improvement_pct > 10.0);
    }

    #[test]
    fn test_sigma_tests_verdicts() {
        let (t, _) = tables();
        assert_eq!(t.tests.len(), 4);
        assert_eq!(t.tests[0].result, "HIGHLY SIGNIFICANT");
        assert_eq!(t.tests[1].result, "LARGE");
        assert_eq!(t.tests[1].p_value, "N/A");
        assert_eq!(t.tests[3].result, "DISTRIBUTIONS DIFFER");
        assert!(t.sigma_tests.cohens_d > 0.8);
    }

    #[test]
    fn test_key_statistics() {
        let (_, ds) = tables();
        let k = KeyStatistics::from_dataset(&ds).unwrap();
        assert!(k.sigma_optimized_mean < k.sigma_baseline_mean);
        assert!(k.sigma_improvement_pct > 50.0);
        assert!(k.welch_p < 1e-6);
        assert!(k.engine_efficiency_delta > 0.0);
        assert!(k.wheel_slip_delta < 0.0);
    }

    #[test]
    fn test_write_csv_layout() {
        let (t, _) = tables();
        let dir = TempDir::new().unwrap();
        let paths = t.write_csv(dir.path()).unwrap();
        assert_eq!(paths.len(), 5);

        let all = read_table(dir.path().join(ALL_METRICS_FILE)).unwrap();
        assert_eq!(
            all.headers(),
            &["Table", "Metric", "Baseline", "Optimized", "Improvement_%"]
        );
        assert_eq!(all.num_rows(), 25);

        let tests = read_table(dir.path().join(STATISTICAL_TESTS_FILE)).unwrap();
        assert_eq!(tests.headers(), &["Test", "Statistic", "p-value", "Result"]);
        assert_eq!(tests.cells("p-value").unwrap()[1], "N/A");

        let turns = read_table(dir.path().join(TURNS_FILE)).unwrap();
        assert_eq!(turns.num_rows(), 14);
    }

    #[test]
    fn test_render_text_mentions_every_group() {
        let (t, _) = tables();
        let text = t.render_text();
        for needle in ["CORE", "DYNAMICS", "CHASSIS", "AERO", "Welch t-test", "Turn5"] {
            assert!(text.contains(needle), "missing {needle}");
        }
    }
}
