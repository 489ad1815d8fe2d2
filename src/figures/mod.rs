//! Publication figures
//!
//! Every figure is described by a [`FigureSpec`]: a grid of [`Panel`]s, each
//! naming what to plot. One renderer ([`render_figure`]) draws any spec to
//! PNG and SVG, so adding a figure means adding data, not code.
//!
//! [`standard_figures`] returns the eight figures of the case study:
//!
//! | Figure | Content |
//! |--------|---------|
//! | 5 | Time series of rpm, throttle, σ and engine efficiency |
//! | 6 | σ distribution: histogram, box plot, Q-Q per setup |
//! | 7 | Phase space: throttle vs rpm per setup |
//! | 8 | σ heatmap by lap and lap phase per setup |
//! | 9 | Metric comparison bars, optimized relative to baseline |
//! | 10 | Tire temperatures, tire pressure and brake temperature |
//! | 11 | Engine efficiency, downforce and battery |
//! | 12 | Per-lap and per-turn breakdown bars |

pub mod data;
pub mod render;

pub use data::{bar_groups, box_stats, heatmap_grid, histogram, qq_points, BarGroup, BoxStats};
pub use render::render_figure;

use crate::telemetry::{Channel, Setup};

/// Reduction of a channel column to one bar height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarStat {
    /// Arithmetic mean
    Mean,
    /// Maximum
    Max,
    /// Magnitude of the mean (signed currents)
    AbsMean,
}

/// A channel reduced to one bar per setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarMetric {
    /// Reduced channel
    pub channel: Channel,
    /// Reduction
    pub stat: BarStat,
}

impl BarMetric {
    /// Metric from a channel and a reduction
    #[must_use]
    pub const fn new(channel: Channel, stat: BarStat) -> Self {
        Self { channel, stat }
    }

    /// Axis label: channel name, with the reduction unless it is the mean
    #[must_use]
    pub fn label(&self) -> String {
        match self.stat {
            BarStat::Mean => self.channel.name().to_string(),
            BarStat::Max => format!("{} (max)", self.channel.name()),
            BarStat::AbsMean => format!("|{}|", self.channel.name()),
        }
    }
}

/// Grouping of a [`Panel::Bar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarGroups {
    /// One group per metric over the whole run, drawn relative to baseline
    Metrics(Vec<BarMetric>),
    /// One group per lap, mean of a channel
    Laps(Channel),
    /// One group per circuit segment, mean of a channel
    Turns(Channel),
}

/// What one panel shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Panel {
    /// Channel over time for both setups, first `laps` laps
    TimeSeries {
        /// Plotted channel
        channel: Channel,
        /// Laps shown
        laps: u32,
    },
    /// Overlaid histograms of both setups
    Histogram {
        /// Plotted channel
        channel: Channel,
        /// Number of bins
        bins: usize,
    },
    /// Side-by-side box plots of both setups
    BoxPlot {
        /// Plotted channel
        channel: Channel,
    },
    /// Normal Q-Q plot of one setup
    QQ {
        /// Plotted channel
        channel: Channel,
        /// Setup
        setup: Setup,
    },
    /// Scatter of two channels for one setup
    Scatter {
        /// Horizontal channel
        x: Channel,
        /// Vertical channel
        y: Channel,
        /// Setup
        setup: Setup,
    },
    /// Channel mean by lap (rows) and lap phase (columns)
    Heatmap {
        /// Plotted channel
        channel: Channel,
        /// Setup
        setup: Setup,
        /// Phase bins per lap
        phase_bins: usize,
    },
    /// Grouped bars, baseline next to optimized
    Bar {
        /// Panel caption
        title: &'static str,
        /// Bar groups
        groups: BarGroups,
    },
}

impl Panel {
    /// Default panel caption
    #[must_use]
    pub fn caption(&self) -> String {
        match self {
            Self::TimeSeries { channel, .. } => format!("{} over time", channel.comment()),
            Self::Histogram { channel, .. } => format!("{} distribution", channel.comment()),
            Self::BoxPlot { channel } => format!("{} by setup", channel.comment()),
            Self::QQ { channel, setup } => format!("Normal Q-Q: {channel} ({setup})"),
            Self::Scatter { x, y, setup } => format!("{y} vs {x} ({setup})"),
            Self::Heatmap { channel, setup, .. } => format!("{channel} by lap phase ({setup})"),
            Self::Bar { title, .. } => (*title).to_string(),
        }
    }
}

/// Layout and content of one figure.
#[derive(Debug, Clone, PartialEq)]
pub struct FigureSpec {
    /// Output file name without extension
    pub file_stem: String,
    /// Figure title
    pub title: String,
    /// Panel grid `(rows, cols)`
    pub grid: (usize, usize),
    /// Physical size in inches `(width, height)`
    pub size_in: (f64, f64),
    /// Panels in row-major order
    pub panels: Vec<Panel>,
}

impl FigureSpec {
    /// Pixel size at a given resolution
    #[must_use]
    pub fn pixels(&self, dpi: u32) -> (u32, u32) {
        let px = |inches: f64| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let v = (inches * f64::from(dpi)).round().max(1.0) as u32;
            v
        };
        (px(self.size_in.0), px(self.size_in.1))
    }
}

fn time_series_grid(channels: [Channel; 4]) -> Vec<Panel> {
    channels
        .into_iter()
        .map(|channel| Panel::TimeSeries { channel, laps: 2 })
        .collect()
}

fn metric_bars(title: &'static str, metrics: [(Channel, BarStat); 4]) -> Panel {
    Panel::Bar {
        title,
        groups: BarGroups::Metrics(
            metrics
                .into_iter()
                .map(|(channel, stat)| BarMetric::new(channel, stat))
                .collect(),
        ),
    }
}

/// Figures 5 to 12 of the case study.
#[must_use]
pub fn standard_figures() -> Vec<FigureSpec> {
    use BarStat::{AbsMean, Max, Mean};
    use Setup::{Baseline, Optimized};
    vec![
        FigureSpec {
            file_stem: "Figure5_TimeSeries".to_string(),
            title: "Figure 5: Telemetry time series, baseline vs optimized".to_string(),
            grid: (2, 2),
            size_in: (12.0, 8.0),
            panels: time_series_grid([
                Channel::EngineRpm,
                Channel::Throttle,
                Channel::Volatility,
                Channel::EngineEfficiency,
            ]),
        },
        FigureSpec {
            file_stem: "Figure6_StatisticalValidation".to_string(),
            title: "Figure 6: Statistical validation of volatility σ".to_string(),
            grid: (2, 2),
            size_in: (12.0, 9.0),
            panels: vec![
                Panel::Histogram {
                    channel: Channel::Volatility,
                    bins: 50,
                },
                Panel::BoxPlot {
                    channel: Channel::Volatility,
                },
                Panel::QQ {
                    channel: Channel::Volatility,
                    setup: Baseline,
                },
                Panel::QQ {
                    channel: Channel::Volatility,
                    setup: Optimized,
                },
            ],
        },
        FigureSpec {
            file_stem: "Figure7_PhaseSpace".to_string(),
            title: "Figure 7: Throttle vs engine speed phase space".to_string(),
            grid: (1, 2),
            size_in: (12.0, 5.0),
            panels: Setup::ALL
                .into_iter()
                .map(|setup| Panel::Scatter {
                    x: Channel::Throttle,
                    y: Channel::EngineRpm,
                    setup,
                })
                .collect(),
        },
        FigureSpec {
            file_stem: "Figure8_VolatilityHeatmap".to_string(),
            title: "Figure 8: Volatility σ by lap and lap phase".to_string(),
            grid: (1, 2),
            size_in: (12.0, 5.0),
            panels: Setup::ALL
                .into_iter()
                .map(|setup| Panel::Heatmap {
                    channel: Channel::Volatility,
                    setup,
                    phase_bins: 50,
                })
                .collect(),
        },
        FigureSpec {
            file_stem: "Figure9_MetricsComparison".to_string(),
            title: "Figure 9: Performance metrics, optimized relative to baseline".to_string(),
            grid: (2, 2),
            size_in: (12.0, 9.0),
            panels: vec![
                metric_bars(
                    "Core engine metrics",
                    [
                        (Channel::EngineRpm, Mean),
                        (Channel::EngineRpm, Max),
                        (Channel::Speed, Max),
                        (Channel::Throttle, Mean),
                    ],
                ),
                metric_bars(
                    "Dynamics and control",
                    [
                        (Channel::WheelSlip, Mean),
                        (Channel::AccelLat, Mean),
                        (Channel::BrakeTemperature, Mean),
                        (Channel::BrakePressure, Mean),
                    ],
                ),
                metric_bars(
                    "Thermal and power",
                    [
                        (Channel::TireTempFl, Mean),
                        (Channel::TireTempRl, Mean),
                        (Channel::BrakeTemperature, Mean),
                        (Channel::BatteryVoltage, Mean),
                    ],
                ),
                metric_bars(
                    "Efficiency",
                    [
                        (Channel::EngineEfficiency, Mean),
                        (Channel::AeroDrag, Mean),
                        (Channel::Volatility, Mean),
                        (Channel::BatteryCurrent, AbsMean),
                    ],
                ),
            ],
        },
        FigureSpec {
            file_stem: "Figure10_ThermalTires".to_string(),
            title: "Figure 10: Thermal management and tire pressure".to_string(),
            grid: (2, 2),
            size_in: (12.0, 8.0),
            panels: time_series_grid([
                Channel::TireTempFl,
                Channel::TireTempRl,
                Channel::TirePressureFl,
                Channel::BrakeTemperature,
            ]),
        },
        FigureSpec {
            file_stem: "Figure11_EfficiencyPower".to_string(),
            title: "Figure 11: Efficiency, aerodynamics and power".to_string(),
            grid: (2, 2),
            size_in: (12.0, 8.0),
            panels: time_series_grid([
                Channel::EngineEfficiency,
                Channel::AeroDownforce,
                Channel::BatteryVoltage,
                Channel::BatteryCurrent,
            ]),
        },
        FigureSpec {
            file_stem: "Figure12_LapBreakdown".to_string(),
            title: "Figure 12: Lap-by-lap and per-turn breakdown".to_string(),
            grid: (2, 2),
            size_in: (12.0, 9.0),
            panels: vec![
                Panel::Bar {
                    title: "Engine speed by lap",
                    groups: BarGroups::Laps(Channel::EngineRpm),
                },
                Panel::Bar {
                    title: "Volatility σ by lap",
                    groups: BarGroups::Laps(Channel::Volatility),
                },
                Panel::Bar {
                    title: "Wheel slip by lap",
                    groups: BarGroups::Laps(Channel::WheelSlip),
                },
                Panel::Bar {
                    title: "Volatility σ by turn",
                    groups: BarGroups::Turns(Channel::Volatility),
                },
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_figures_fill_their_grids() {
        let figures = standard_figures();
        assert_eq!(figures.len(), 8);
        for f in &figures {
            assert_eq!(f.panels.len(), f.grid.0 * f.grid.1, "{}", f.file_stem);
        }
        for (f, n) in figures.iter().zip(5..) {
            assert!(f.file_stem.starts_with(&format!("Figure{n}_")), "{}", f.file_stem);
        }
    }

    #[test]
    fn test_bar_panels() {
        let figures = standard_figures();
        let bars = |f: &FigureSpec| {
            f.panels
                .iter()
                .filter(|p| matches!(p, Panel::Bar { .. }))
                .count()
        };
        assert_eq!(bars(&figures[4]), 4);
        assert_eq!(bars(&figures[7]), 4);
        assert!(figures[7]
            .panels
            .iter()
            .any(|p| matches!(p, Panel::Bar { groups: BarGroups::Turns(_), .. })));
        assert_eq!(figures[7].panels[0].caption(), "Engine speed by lap");

        let peak = BarMetric::new(Channel::Speed, BarStat::Max);
        assert_eq!(peak.label(), format!("{} (max)", Channel::Speed.name()));
    }

    #[test]
    fn test_pixels() {
        let f = &standard_figures()[0];
        assert_eq!(f.pixels(100), (1200, 800));
        assert_eq!(f.pixels(300), (3600, 2400));
    }

    #[test]
    fn test_captions() {
        let qq = Panel::QQ {
            channel: Channel::Volatility,
            setup: Setup::Optimized,
        };
        assert_eq!(qq.caption(), "Normal Q-Q: glicko_volatility_sigma (optimized)");
    }
}
