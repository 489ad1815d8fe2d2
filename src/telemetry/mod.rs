//! Telemetry data model
//!
//! A [`TelemetryDataset`] holds two column-major [`TelemetryFrame`]s, baseline
//! first. Columns are indexed by [`Channel`]; the lap index is kept as a
//! separate integer column.
//!
//! Generation lives in [`generator`], the σ proxy in [`volatility`].

pub mod channels;
pub mod generator;
pub mod volatility;

pub use channels::Channel;
pub use generator::generate_dataset;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Machine configuration under study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Setup {
    /// Original long gearing
    Baseline,
    /// Shortened gearing
    Optimized,
}

impl Setup {
    /// Both setups in dataset order
    pub const ALL: [Self; 2] = [Self::Baseline, Self::Optimized];

    /// CSV label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Optimized => "optimized",
        }
    }

    /// Constant multipliers applied by the generator
    #[must_use]
    pub const fn modifiers(self) -> SetupModifiers {
        match self {
            Self::Baseline => SetupModifiers::BASELINE,
            Self::Optimized => SetupModifiers::OPTIMIZED,
        }
    }
}

impl fmt::Display for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Setup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "optimized" => Ok(Self::Optimized),
            other => Err(Error::InvalidInput(format!(
                "unknown setup '{other}' (expected 'baseline' or 'optimized')"
            ))),
        }
    }
}

/// Per-setup multipliers on the generated signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetupModifiers {
    /// Engine speed multiplier
    pub rpm: f64,
    /// Throttle multiplier
    pub throttle: f64,
    /// Lateral acceleration multiplier
    pub lateral: f64,
    /// Wheel slip multiplier
    pub slip: f64,
    /// Volatility multiplier
    pub sigma: f64,
    /// Additive engine efficiency offset (percentage points)
    pub efficiency_offset: f64,
}

impl SetupModifiers {
    /// Identity modifiers
    pub const BASELINE: Self = Self {
        rpm: 1.0,
        throttle: 1.0,
        lateral: 1.0,
        slip: 1.0,
        sigma: 1.0,
        efficiency_offset: 0.0,
    };

    /// Shorter gearing: lower revs, smoother throttle, less slip
    pub const OPTIMIZED: Self = Self {
        rpm: 0.85,
        throttle: 1.05,
        lateral: 0.95,
        slip: 0.6,
        sigma: 0.165,
        efficiency_offset: 3.0,
    };
}

/// Samples of one setup, stored column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    setup: Setup,
    columns: Vec<Vec<f64>>,
    laps: Vec<u32>,
}

impl TelemetryFrame {
    /// Build a frame from complete columns.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the column count is wrong, or
    /// `InvalidInput` if columns differ in length.
    pub fn new(setup: Setup, columns: Vec<Vec<f64>>, laps: Vec<u32>) -> Result<Self> {
        if columns.len() != Channel::COUNT {
            return Err(Error::SchemaMismatch {
                expected: format!("{} channels", Channel::COUNT),
                got: format!("{} channels", columns.len()),
            });
        }
        if let Some((i, col)) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != laps.len())
        {
            return Err(Error::InvalidInput(format!(
                "column '{}' has {} samples, expected {}",
                Channel::ALL[i],
                col.len(),
                laps.len()
            )));
        }
        Ok(Self {
            setup,
            columns,
            laps,
        })
    }

    /// Setup of every sample in this frame
    #[must_use]
    pub const fn setup(&self) -> Setup {
        self.setup
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.laps.len()
    }

    /// True when the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.laps.is_empty()
    }

    /// One channel column
    #[must_use]
    pub fn column(&self, channel: Channel) -> &[f64] {
        &self.columns[channel.index()]
    }

    /// Global lap index of every sample
    #[must_use]
    pub fn laps(&self) -> &[u32] {
        &self.laps
    }

    /// Value of one channel at one sample
    #[must_use]
    pub fn value(&self, channel: Channel, row: usize) -> f64 {
        self.columns[channel.index()][row]
    }

    /// Indices of samples whose values satisfy a predicate on one channel
    pub fn select(&self, channel: Channel, pred: impl Fn(f64) -> bool) -> Vec<usize> {
        self.column(channel)
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| pred(v).then_some(i))
            .collect()
    }

    /// Gather a channel at the given sample indices
    #[must_use]
    pub fn gather(&self, channel: Channel, rows: &[usize]) -> Vec<f64> {
        let col = self.column(channel);
        rows.iter().map(|&i| col[i]).collect()
    }
}

/// Baseline and optimized frames of one study.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryDataset {
    baseline: TelemetryFrame,
    optimized: TelemetryFrame,
}

impl TelemetryDataset {
    /// Pair two frames.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the frames are tagged with the wrong setups.
    pub fn new(baseline: TelemetryFrame, optimized: TelemetryFrame) -> Result<Self> {
        if baseline.setup() != Setup::Baseline || optimized.setup() != Setup::Optimized {
            return Err(Error::InvalidInput(format!(
                "frames must be (baseline, optimized), got ({}, {})",
                baseline.setup(),
                optimized.setup()
            )));
        }
        Ok(Self {
            baseline,
            optimized,
        })
    }

    /// Frame of one setup
    #[must_use]
    pub const fn frame(&self, setup: Setup) -> &TelemetryFrame {
        match setup {
            Setup::Baseline => &self.baseline,
            Setup::Optimized => &self.optimized,
        }
    }

    /// Both frames in dataset order
    #[must_use]
    pub fn frames(&self) -> [&TelemetryFrame; 2] {
        [&self.baseline, &self.optimized]
    }

    /// Total row count
    #[must_use]
    pub fn rows(&self) -> usize {
        self.baseline.len() + self.optimized.len()
    }

    /// One column of one setup
    #[must_use]
    pub fn column(&self, setup: Setup, channel: Channel) -> &[f64] {
        self.frame(setup).column(channel)
    }

    /// Rows in CSV order (baseline first)
    pub fn iter_rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.frames()
            .into_iter()
            .flat_map(|frame| (0..frame.len()).map(move |row| RowRef { frame, row }))
    }
}

/// Borrowed view of one sample.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    frame: &'a TelemetryFrame,
    row: usize,
}

impl RowRef<'_> {
    /// Setup label of the row
    #[must_use]
    pub const fn setup(&self) -> Setup {
        self.frame.setup
    }

    /// Global lap index
    #[must_use]
    pub fn lap(&self) -> u32 {
        self.frame.laps[self.row]
    }

    /// Value of one channel
    #[must_use]
    pub fn value(&self, channel: Channel) -> f64 {
        self.frame.value(channel, self.row)
    }
}
