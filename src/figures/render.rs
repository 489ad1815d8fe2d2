//! Plotters renderer for [`FigureSpec`]s
//!
//! Each figure is drawn twice through the same code path: once to a PNG
//! bitmap and once to SVG. Font sizes and margins scale with the resolution.

use super::data::{
    bar_groups, box_stats, heatmap_grid, histogram, qq_points, qq_reference, thin, value_range,
    BarGroup,
};
use super::{BarGroups, FigureSpec, Panel};
use crate::telemetry::{Channel, Setup, TelemetryDataset, TelemetryFrame};
use crate::{Error, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Points drawn per line or scatter series
const MAX_POINTS: usize = 5_000;

const BASELINE_COLOR: RGBColor = RGBColor(31, 119, 180);
const OPTIMIZED_COLOR: RGBColor = RGBColor(214, 39, 40);

const fn setup_color(setup: Setup) -> RGBColor {
    match setup {
        Setup::Baseline => BASELINE_COLOR,
        Setup::Optimized => OPTIMIZED_COLOR,
    }
}

fn plot_err<E: std::error::Error + Send + Sync>(e: DrawingAreaErrorKind<E>) -> Error {
    Error::Figure(e.to_string())
}

/// Font and spacing sizes for one resolution.
#[derive(Debug, Clone, Copy)]
struct Scale(f64);

impl Scale {
    fn font(self, base: f64) -> (&'static str, f64) {
        ("sans-serif", base * self.0)
    }

    fn px(self, base: f64) -> u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let v = (base * self.0).round().max(1.0) as u32;
        v
    }
}

/// Render one figure to `<dir>/<file_stem>.png` and `.svg`.
///
/// # Errors
///
/// Returns `Figure` if drawing fails, or `Io` if `dir` cannot be created.
pub fn render_figure(
    spec: &FigureSpec,
    dataset: &TelemetryDataset,
    dir: &Path,
    dpi: u32,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let size = spec.pixels(dpi);
    let scale = Scale(f64::from(dpi) / 100.0);

    let png = dir.join(format!("{}.png", spec.file_stem));
    {
        let root = BitMapBackend::new(&png, size).into_drawing_area();
        draw_figure(&root, spec, dataset, scale)?;
        root.present().map_err(plot_err)?;
    }

    let svg = dir.join(format!("{}.svg", spec.file_stem));
    {
        let root = SVGBackend::new(&svg, size).into_drawing_area();
        draw_figure(&root, spec, dataset, scale)?;
        root.present().map_err(plot_err)?;
    }

    debug!(figure = %spec.file_stem, width = size.0, height = size.1, "figure rendered");
    Ok(vec![png, svg])
}

fn draw_figure<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    spec: &FigureSpec,
    dataset: &TelemetryDataset,
    scale: Scale,
) -> Result<()> {
    root.fill(&WHITE).map_err(plot_err)?;
    let body = root
        .titled(&spec.title, scale.font(22.0))
        .map_err(plot_err)?;
    let areas = body.split_evenly(spec.grid);
    for (area, panel) in areas.iter().zip(&spec.panels) {
        match panel {
            Panel::TimeSeries { channel, laps } => {
                draw_time_series(area, panel, dataset, *channel, *laps, scale)?;
            }
            Panel::Histogram { channel, bins } => {
                draw_histogram(area, panel, dataset, *channel, *bins, scale)?;
            }
            Panel::BoxPlot { channel } => draw_box_plot(area, panel, dataset, *channel, scale)?,
            Panel::QQ { channel, setup } => {
                draw_qq(area, panel, dataset.column(*setup, *channel), *setup, scale)?;
            }
            Panel::Scatter { x, y, setup } => {
                draw_scatter(area, panel, dataset.frame(*setup), *x, *y, scale)?;
            }
            Panel::Heatmap {
                channel,
                setup,
                phase_bins,
            } => draw_heatmap(area, panel, dataset.frame(*setup), *channel, *phase_bins, scale)?,
            Panel::Bar { groups, .. } => draw_bars(area, panel, dataset, groups, scale)?,
        }
    }
    Ok(())
}

/// Rows of the first `laps` laps of a frame.
fn leading_laps(frame: &TelemetryFrame, laps: u32) -> usize {
    let Some(&first) = frame.laps().first() else {
        return 0;
    };
    frame.laps().partition_point(|&l| l < first + laps)
}

fn pad((lo, hi): (f64, f64)) -> std::ops::Range<f64> {
    let margin = (hi - lo) * 0.05;
    (lo - margin)..(hi + margin)
}

fn draw_time_series<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    dataset: &TelemetryDataset,
    channel: Channel,
    laps: u32,
    scale: Scale,
) -> Result<()> {
    let series: Vec<(Setup, Vec<(f64, f64)>)> = Setup::ALL
        .into_iter()
        .map(|setup| {
            let frame = dataset.frame(setup);
            let n = leading_laps(frame, laps);
            let time = &frame.column(Channel::Time)[..n];
            let t0 = time.first().copied().unwrap_or(0.0);
            let points: Vec<(f64, f64)> = time
                .iter()
                .zip(&frame.column(channel)[..n])
                .map(|(t, v)| (t - t0, *v))
                .collect();
            (setup, thin(&points, MAX_POINTS))
        })
        .collect();

    let xs: Vec<f64> = series.iter().flat_map(|(_, p)| p.iter().map(|q| q.0)).collect();
    let ys: Vec<f64> = series.iter().flat_map(|(_, p)| p.iter().map(|q| q.1)).collect();
    let (x0, x1) = value_range([xs.as_slice()]);

    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption(), scale.font(15.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(55.0))
        .build_cartesian_2d(x0..x1, pad(value_range([ys.as_slice()])))
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("Elapsed time (s)")
        .y_desc(format!("{} ({})", channel.name(), channel.unit()))
        .label_style(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;

    for (setup, points) in series {
        let color = setup_color(setup);
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(scale.px(1.0))))
            .map_err(plot_err)?
            .label(setup.label())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;
    Ok(())
}

fn draw_histogram<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    dataset: &TelemetryDataset,
    channel: Channel,
    bins: usize,
    scale: Scale,
) -> Result<()> {
    let bins = bins.max(1);
    let b = dataset.column(Setup::Baseline, channel);
    let o = dataset.column(Setup::Optimized, channel);
    let range = value_range([b, o]);
    #[allow(clippy::cast_precision_loss)]
    let width = (range.1 - range.0) / bins as f64;
    let counts = [
        (Setup::Baseline, histogram(b, bins, range)),
        (Setup::Optimized, histogram(o, bins, range)),
    ];
    let top = counts
        .iter()
        .flat_map(|(_, c)| c.iter().copied())
        .max()
        .unwrap_or(1)
        .max(1);

    #[allow(clippy::cast_precision_loss)]
    let y_max = top as f64 * 1.05;
    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption(), scale.font(15.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(55.0))
        .build_cartesian_2d(range.0..range.1, 0.0..y_max)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(format!("{} ({})", channel.name(), channel.unit()))
        .y_desc("Count")
        .label_style(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;

    for (setup, counts) in counts {
        let color = setup_color(setup);
        chart
            .draw_series(counts.into_iter().enumerate().map(|(i, c)| {
                #[allow(clippy::cast_precision_loss)]
                let x = range.0 + i as f64 * width;
                #[allow(clippy::cast_precision_loss)]
                let h = c as f64;
                Rectangle::new([(x, 0.0), (x + width, h)], color.mix(0.5).filled())
            }))
            .map_err(plot_err)?
            .label(setup.label())
            .legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.mix(0.5).filled())
            });
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;
    Ok(())
}

fn box_axis_label(x: f64) -> String {
    Setup::ALL
        .iter()
        .enumerate()
        .find(|(i, _)| {
            #[allow(clippy::cast_precision_loss)]
            let centre = *i as f64;
            (x - centre).abs() < 1e-6
        })
        .map(|(_, s)| s.label().to_string())
        .unwrap_or_default()
}

fn draw_box_plot<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    dataset: &TelemetryDataset,
    channel: Channel,
    scale: Scale,
) -> Result<()> {
    let boxes = Setup::ALL
        .into_iter()
        .map(|s| box_stats(dataset.column(s, channel)).map(|b| (s, b)))
        .collect::<Result<Vec<_>>>()?;
    let lo = boxes.iter().map(|(_, b)| b.lower_whisker).fold(f64::INFINITY, f64::min);
    let hi = boxes.iter().map(|(_, b)| b.upper_whisker).fold(f64::NEG_INFINITY, f64::max);

    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption(), scale.font(15.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(55.0))
        .build_cartesian_2d(-0.5..1.5, pad(value_range([&[lo, hi][..]])))
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(5)
        .x_label_formatter(&|x: &f64| box_axis_label(*x))
        .y_desc(format!("{} ({})", channel.name(), channel.unit()))
        .label_style(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;

    let stroke = scale.px(1.5);
    for (i, (setup, b)) in boxes.into_iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let x = i as f64;
        let color = setup_color(setup);
        chart
            .draw_series([
                Rectangle::new([(x - 0.3, b.q1), (x + 0.3, b.q3)], color.mix(0.35).filled()),
                Rectangle::new([(x - 0.3, b.q1), (x + 0.3, b.q3)], color.stroke_width(stroke)),
            ])
            .map_err(plot_err)?;
        chart
            .draw_series([
                PathElement::new(
                    vec![(x - 0.3, b.median), (x + 0.3, b.median)],
                    BLACK.stroke_width(stroke),
                ),
                PathElement::new(vec![(x, b.q3), (x, b.upper_whisker)], color.stroke_width(stroke)),
                PathElement::new(vec![(x, b.q1), (x, b.lower_whisker)], color.stroke_width(stroke)),
                PathElement::new(
                    vec![(x - 0.15, b.upper_whisker), (x + 0.15, b.upper_whisker)],
                    color.stroke_width(stroke),
                ),
                PathElement::new(
                    vec![(x - 0.15, b.lower_whisker), (x + 0.15, b.lower_whisker)],
                    color.stroke_width(stroke),
                ),
            ])
            .map_err(plot_err)?;
    }
    Ok(())
}

fn draw_qq<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    values: &[f64],
    setup: Setup,
    scale: Scale,
) -> Result<()> {
    let points = thin(&qq_points(values), MAX_POINTS);
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let (x0, x1) = value_range([xs.as_slice()]);
    let (intercept, slope) = qq_reference(values);

    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption(), scale.font(15.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(55.0))
        .build_cartesian_2d(pad((x0, x1)), pad(value_range([ys.as_slice()])))
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("Theoretical quantile")
        .y_desc("Sample quantile")
        .label_style(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;

    let color = setup_color(setup);
    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 2, color.mix(0.6).filled())))
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new(
            [x0, x1].map(|x| (x, intercept + slope * x)),
            BLACK.stroke_width(scale.px(1.0)),
        ))
        .map_err(plot_err)?;
    Ok(())
}

fn draw_scatter<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    frame: &TelemetryFrame,
    x: Channel,
    y: Channel,
    scale: Scale,
) -> Result<()> {
    let xs = frame.column(x);
    let ys = frame.column(y);
    let points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
    let points = thin(&points, MAX_POINTS);

    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption(), scale.font(15.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(55.0))
        .build_cartesian_2d(pad(value_range([xs])), pad(value_range([ys])))
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc(format!("{} ({})", x.name(), x.unit()))
        .y_desc(format!("{} ({})", y.name(), y.unit()))
        .label_style(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;

    let color = setup_color(frame.setup());
    chart
        .draw_series(points.into_iter().map(|p| Circle::new(p, 1, color.mix(0.3).filled())))
        .map_err(plot_err)?;
    Ok(())
}

/// Label of the category centred on integer position `x`, empty elsewhere.
fn category_label(labels: &[String], x: f64) -> String {
    let nearest = x.round();
    if (x - nearest).abs() > 1e-6 || nearest < 0.0 {
        return String::new();
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = nearest as usize;
    labels.get(idx).cloned().unwrap_or_default()
}

/// Bar heights per setup; metric groups are scaled to baseline = 100.
fn bar_heights(groups: &BarGroups, bars: &[BarGroup]) -> Vec<(f64, f64)> {
    match groups {
        BarGroups::Metrics(_) => bars
            .iter()
            .map(|g| {
                let pct = g.optimized_pct();
                (100.0, if pct.is_finite() { pct } else { 0.0 })
            })
            .collect(),
        BarGroups::Laps(_) | BarGroups::Turns(_) => {
            bars.iter().map(|g| (g.baseline, g.optimized)).collect()
        }
    }
}

fn draw_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    dataset: &TelemetryDataset,
    groups: &BarGroups,
    scale: Scale,
) -> Result<()> {
    let bars = bar_groups(dataset, groups);
    if bars.is_empty() {
        return Err(Error::Figure(format!("{}: no bar groups to plot", panel.caption())));
    }
    let heights = bar_heights(groups, &bars);
    let labels: Vec<String> = bars.into_iter().map(|g| g.label).collect();
    let flat: Vec<f64> = heights.iter().flat_map(|&(b, o)| [b, o]).collect();
    let (lo, hi) = value_range([flat.as_slice(), &[0.0][..]]);
    let margin = (hi - lo) * 0.1;
    let floor = if lo < 0.0 { lo - margin } else { 0.0 };
    let (x_desc, y_desc) = match groups {
        BarGroups::Metrics(_) => (String::new(), "% of baseline".to_string()),
        BarGroups::Laps(c) => ("Lap".to_string(), format!("{} ({})", c.name(), c.unit())),
        BarGroups::Turns(c) => ("Segment".to_string(), format!("{} ({})", c.name(), c.unit())),
    };

    #[allow(clippy::cast_precision_loss)]
    let n = labels.len() as f64;
    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption(), scale.font(15.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(55.0))
        .build_cartesian_2d(-0.5..n - 0.5, floor..hi + margin)
        .map_err(plot_err)?;
    let formatter = |x: &f64| category_label(&labels, *x);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len() * 2 + 1)
        .x_label_formatter(&formatter)
        .x_desc(x_desc)
        .y_desc(y_desc)
        .label_style(scale.font(10.0))
        .draw()
        .map_err(plot_err)?;

    for (side, setup) in [(-1.0, Setup::Baseline), (0.0, Setup::Optimized)] {
        let color = setup_color(setup);
        chart
            .draw_series(heights.iter().enumerate().map(|(i, &(b, o))| {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f64 + side * 0.35;
                let h = if setup == Setup::Baseline { b } else { o };
                Rectangle::new([(x, 0.0), (x + 0.35, h)], color.mix(0.8).filled())
            }))
            .map_err(plot_err)?
            .label(setup.label())
            .legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.mix(0.8).filled())
            });
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;
    Ok(())
}

/// Blue (low) to red (high) colour for `v` within `[lo, hi]`.
fn heat_color(v: f64, lo: f64, hi: f64) -> HSLColor {
    let t = if hi > lo { ((v - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 0.5 };
    HSLColor(0.66 * (1.0 - t), 0.85, 0.5)
}

fn draw_heatmap<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    frame: &TelemetryFrame,
    channel: Channel,
    phase_bins: usize,
    scale: Scale,
) -> Result<()> {
    let grid = heatmap_grid(frame, channel, phase_bins);
    if grid.is_empty() {
        return Err(Error::Figure(format!(
            "heatmap of {channel}: no laps to plot for {}",
            frame.setup()
        )));
    }
    let flat: Vec<f64> = grid.iter().flatten().copied().collect();
    let (lo, hi) = value_range([flat.as_slice()]);

    #[allow(clippy::cast_precision_loss)]
    let (cols, rows) = (phase_bins as f64, grid.len() as f64);
    let mut chart = ChartBuilder::on(area)
        .caption(panel.caption(), scale.font(15.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(40.0))
        .build_cartesian_2d(0.0..cols, 0.0..rows)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Lap phase bin")
        .y_desc("Lap")
        .label_style(scale.font(11.0))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(grid.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().filter(|(_, v)| v.is_finite()).map(move |(c, &v)| {
                #[allow(clippy::cast_precision_loss)]
                let (x, y) = (c as f64, r as f64);
                Rectangle::new([(x, y), (x + 1.0, y + 1.0)], heat_color(v, lo, hi).filled())
            })
        }))
        .map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StudyConfig;
    use crate::telemetry::generate_dataset;

    #[test]
    fn test_leading_laps() {
        let config = StudyConfig::builder().laps_per_setup(3).sample_rate_hz(10).build();
        let ds = generate_dataset(&config).unwrap();
        assert_eq!(leading_laps(ds.frame(Setup::Baseline), 2), 200);
        // Optimized laps are numbered after the baseline ones
        assert_eq!(leading_laps(ds.frame(Setup::Optimized), 1), 100);
        assert_eq!(leading_laps(ds.frame(Setup::Optimized), 10), 300);
    }

    #[test]
    fn test_heat_color_endpoints() {
        let HSLColor(h_lo, ..) = heat_color(0.0, 0.0, 1.0);
        let HSLColor(h_hi, ..) = heat_color(1.0, 0.0, 1.0);
        assert!((h_lo - 0.66).abs() < 1e-12);
        assert!(h_hi.abs() < 1e-12);
    }

    #[test]
    fn test_category_label() {
        let labels = vec!["Turn1".to_string(), "Turn2".to_string()];
        assert_eq!(category_label(&labels, 0.0), "Turn1");
        assert_eq!(category_label(&labels, 1.0), "Turn2");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, -1.0), "");
        assert_eq!(category_label(&labels, 2.0), "");
    }

    #[test]
    fn test_metric_bars_scale_to_baseline() {
        use crate::figures::{BarMetric, BarStat};
        let groups = BarGroups::Metrics(vec![BarMetric::new(Channel::Speed, BarStat::Mean)]);
        let bars = [
            BarGroup {
                label: "speed_kmh".to_string(),
                baseline: 200.0,
                optimized: 210.0,
            },
            BarGroup {
                label: "zero".to_string(),
                baseline: 0.0,
                optimized: 1.0,
            },
        ];
        let h = bar_heights(&groups, &bars);
        assert_eq!(h[0].0, 100.0);
        assert!((h[0].1 - 105.0).abs() < 1e-12);
        assert_eq!(h[1], (100.0, 0.0));

        let raw = bar_heights(&BarGroups::Laps(Channel::Speed), &bars);
        assert_eq!(raw[0], (200.0, 210.0));
    }

    #[test]
    fn test_box_axis_label() {
        assert_eq!(box_axis_label(0.0), "baseline");
        assert_eq!(box_axis_label(1.0), "optimized");
        assert_eq!(box_axis_label(0.5), "");
    }
}
