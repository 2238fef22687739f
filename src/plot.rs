use std::{
    fs,
    path::{Path, PathBuf},
};

use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::{info, warn};

use crate::models::{HeatmapGrid, HeightStat, PerformanceMetrics, TemperatureStat};
use crate::report::Summary;

const FONT: &str = "sans-serif";

const SKY_BLUE: RGBColor = RGBColor(135, 206, 235);
const LIGHT_GREEN: RGBColor = RGBColor(144, 238, 144);
const TIMING_COLORS: [RGBColor; 3] = [
    RGBColor(0x34, 0x98, 0xdb),
    RGBColor(0x2e, 0xcc, 0x71),
    RGBColor(0xe7, 0x4c, 0x3c),
];

/// Space above the dashboard's summary panel, in points.
const PANEL_GAP: f64 = 24.0;

/// Width of a height bar, in meters.
const HEIGHT_BAR_WIDTH: f64 = 100.0;
/// Width of a heatmap column, in °C.
const TEMP_GROUP_WIDTH: f64 = 5.0;

type DrawResult<DB> = Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("Could not create the output directory `{}`", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not draw `{}`: {message}", .path.display())]
    Draw { path: PathBuf, message: String },
}

/// Files written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPaths {
    pub height: PathBuf,
    pub temperature: PathBuf,
    pub heatmap: PathBuf,
    pub combined: PathBuf,
}

impl ChartPaths {
    pub fn new(dir: &Path, stamp: &str) -> Self {
        let path = |name: &str| dir.join(format!("{name}_{stamp}.png"));
        Self {
            height: path("height_performance"),
            temperature: path("temperature_performance"),
            heatmap: path("heatmap_performance"),
            combined: path("combined_performance"),
        }
    }
}

/// `YYYYMMDD_HHMMSS`, used to tell runs apart in the output directory.
pub fn file_stamp(at: PrimitiveDateTime) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// Charts actually written, in drawing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub written: Vec<PathBuf>,
    pub combined: PathBuf,
}

/// Draws the four charts into `dir`.
///
/// Returns `None` without touching the disk when there are no height or no
/// temperature statistics. The heatmap is skipped when there is no cell.
pub fn render_charts(
    metrics: &PerformanceMetrics,
    summary: &Summary,
    dir: &Path,
    stamp: &str,
    dpi: u32,
) -> Result<Option<Rendered>, PlotError> {
    if metrics.heights.is_empty() || metrics.temperatures.is_empty() {
        warn!("Not enough data to draw the charts");
        return Ok(None);
    }

    fs::create_dir_all(dir).map_err(|source| PlotError::OutputDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let scale = Scale::new(dpi);
    let paths = ChartPaths::new(dir, stamp);
    let mut written = Vec::with_capacity(4);

    info!("Drawing the height chart");
    let root = BitMapBackend::new(&paths.height, scale.size(12.0, 6.0)).into_drawing_area();
    drawn(&paths.height, height_chart(&root, &metrics.heights, scale))?;
    written.push(paths.height.clone());

    info!("Drawing the temperature chart");
    let root = BitMapBackend::new(&paths.temperature, scale.size(12.0, 6.0)).into_drawing_area();
    drawn(
        &paths.temperature,
        temperature_chart(&root, &metrics.temperatures, scale),
    )?;
    written.push(paths.temperature.clone());

    let grid = HeatmapGrid::from_cells(&metrics.heatmap);
    if !grid.is_empty() {
        info!("Drawing the heatmap");
        let root = BitMapBackend::new(&paths.heatmap, scale.size(14.0, 8.0)).into_drawing_area();
        drawn(&paths.heatmap, heatmap_chart(&root, &grid, scale))?;
        written.push(paths.heatmap.clone());
    }

    info!("Drawing the dashboard");
    {
        let root =
            BitMapBackend::new(&paths.combined, scale.size(14.0, 10.0)).into_drawing_area();
        drawn(&paths.combined, dashboard(&root, metrics, summary, scale))?;
    }
    written.push(paths.combined.clone());

    Ok(Some(Rendered {
        written,
        combined: paths.combined,
    }))
}

fn drawn<E>(path: &Path, result: Result<(), DrawingAreaErrorKind<E>>) -> Result<(), PlotError>
where
    E: std::error::Error + Send + Sync,
{
    result.map_err(|e| PlotError::Draw {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Inches and points to pixels at a given dpi.
#[derive(Debug, Clone, Copy)]
struct Scale {
    dpi: f64,
}

impl Scale {
    fn new(dpi: u32) -> Self {
        Self {
            dpi: f64::from(dpi.max(1)),
        }
    }

    /// Pixel size of a figure given in inches.
    fn size(self, width: f64, height: f64) -> (u32, u32) {
        (
            (width * self.dpi).round() as u32,
            (height * self.dpi).round() as u32,
        )
    }

    /// Points to pixels.
    fn px(self, points: f64) -> i32 {
        (points * self.dpi / 72.0).round().max(1.0) as i32
    }

    fn font(self, points: f64) -> FontDesc<'static> {
        (FONT, self.px(points)).into_font()
    }
}

fn height_chart<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    stats: &[HeightStat],
    scale: Scale,
) -> DrawResult<DB> {
    area.fill(&WHITE)?;

    let x_range = height_range(stats);
    let mut chart = ChartBuilder::on(area)
        .caption("Performance by height", scale.font(14.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(50.0))
        .right_y_label_area_size(scale.px(50.0))
        .build_cartesian_2d(
            x_range.clone(),
            0.0..upper_bound(stats.iter().map(|s| s.timings.avg_time)),
        )?
        .set_secondary_coord(
            x_range,
            0.0..upper_bound(stats.iter().map(|s| s.timings.error_count as f64)),
        );

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Height (m)")
        .y_desc("Average calculation time (ms)")
        .label_style(scale.font(10.0))
        .axis_desc_style(scale.font(12.0).color(&BLUE))
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc("Errors")
        .label_style(scale.font(10.0))
        .axis_desc_style(scale.font(12.0).color(&RED))
        .draw()?;

    chart
        .draw_series(stats.iter().map(|stat| height_bar(stat, SKY_BLUE)))?
        .label("Average time (ms)")
        .legend(move |(x, y)| legend_box(x, y, SKY_BLUE, scale));
    chart
        .draw_secondary_series(LineSeries::new(
            stats
                .iter()
                .map(|stat| (stat.height, stat.timings.error_count as f64)),
            RED.stroke_width(2),
        ))?
        .label("Errors")
        .legend(move |(x, y)| legend_line(x, y, RED, scale));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .label_font(scale.font(10.0))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    area.present()
}

fn temperature_chart<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    stats: &[TemperatureStat],
    scale: Scale,
) -> DrawResult<DB> {
    area.fill(&WHITE)?;

    let labels: Vec<String> = stats.iter().map(TemperatureStat::label).collect();
    let buckets = 0..stats.len().saturating_sub(1);
    let mut chart = ChartBuilder::on(area)
        .caption("Performance by temperature", scale.font(14.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(50.0))
        .right_y_label_area_size(scale.px(50.0))
        .build_cartesian_2d(
            buckets.clone().into_segmented(),
            0.0..upper_bound(stats.iter().map(|s| s.timings.avg_time)),
        )?
        .set_secondary_coord(
            buckets.into_segmented(),
            0.0..upper_bound(stats.iter().map(|s| s.timings.error_count as f64)),
        );

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len())
        .x_label_formatter(&|bucket| bucket_label(&labels, bucket))
        .x_desc("Temperature range (°C)")
        .y_desc("Average calculation time (ms)")
        .label_style(scale.font(10.0))
        .axis_desc_style(scale.font(12.0).color(&GREEN))
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc("Errors")
        .label_style(scale.font(10.0))
        .axis_desc_style(scale.font(12.0).color(&RED))
        .draw()?;

    let margin = scale.px(4.0) as u32;
    chart
        .draw_series(stats.iter().enumerate().map(|(i, stat)| {
            segment_bar(i, stat.timings.avg_time, LIGHT_GREEN, margin)
        }))?
        .label("Average time (ms)")
        .legend(move |(x, y)| legend_box(x, y, LIGHT_GREEN, scale));
    chart
        .draw_secondary_series(LineSeries::new(
            stats
                .iter()
                .enumerate()
                .map(|(i, stat)| (SegmentValue::CenterOf(i), stat.timings.error_count as f64)),
            RED.stroke_width(2),
        ))?
        .label("Errors")
        .legend(move |(x, y)| legend_line(x, y, RED, scale));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .label_font(scale.font(10.0))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    area.present()
}

fn heatmap_chart<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    grid: &HeatmapGrid,
    scale: Scale,
) -> DrawResult<DB> {
    area.fill(&WHITE)?;

    let x_edges = cell_edges(&grid.temp_groups, TEMP_GROUP_WIDTH);
    let y_edges = cell_edges(&grid.heights, HEIGHT_BAR_WIDTH);
    let (Some(&x_min), Some(&x_max), Some(&y_min), Some(&y_max)) = (
        x_edges.first(),
        x_edges.last(),
        y_edges.first(),
        y_edges.last(),
    ) else {
        return area.present();
    };
    let (low, high) = match grid.value_range() {
        Some((low, high)) if high > low => (low, high),
        Some((low, _)) => (low, low + 1.0),
        None => (0.0, 1.0),
    };

    let (width, _) = area.dim_in_pixel();
    let (plot, color_bar) = area.split_horizontally((f64::from(width) * 0.88) as i32);

    let mut chart = ChartBuilder::on(&plot)
        .caption("Calculation time heatmap", scale.font(14.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(50.0))
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Temperature (°C)")
        .y_desc("Height (m)")
        .label_style(scale.font(10.0))
        .axis_desc_style(scale.font(12.0))
        .draw()?;

    let cells = grid.values.iter().enumerate().flat_map(|(row, values)| {
        values
            .iter()
            .enumerate()
            .filter_map(move |(column, value)| value.map(|value| (row, column, value)))
    });
    chart.draw_series(cells.map(|(row, column, value)| {
        Rectangle::new(
            [
                (x_edges[column], y_edges[row]),
                (x_edges[column + 1], y_edges[row + 1]),
            ],
            viridis((value - low) / (high - low)).filled(),
        )
    }))?;

    let mut bar = ChartBuilder::on(&color_bar)
        .margin(scale.px(8.0))
        .margin_top(scale.px(30.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(60.0))
        .build_cartesian_2d(0.0..1.0, low..high)?;

    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc("Average calculation time (ms)")
        .label_style(scale.font(9.0))
        .axis_desc_style(scale.font(10.0))
        .draw()?;

    const STEPS: usize = 128;
    let step = (high - low) / STEPS as f64;
    bar.draw_series((0..STEPS).map(|i| {
        let bottom = low + step * i as f64;
        Rectangle::new(
            [(0.0, bottom), (1.0, bottom + step)],
            viridis(i as f64 / (STEPS - 1) as f64).filled(),
        )
    }))?;

    area.present()
}

fn dashboard<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    metrics: &PerformanceMetrics,
    summary: &Summary,
    scale: Scale,
) -> DrawResult<DB> {
    root.fill(&WHITE)?;

    let area = root.titled("Interpolation performance analysis", scale.font(16.0))?;
    let panels = area.split_evenly((2, 2));
    if let [heights, temperatures, timings, text] = panels.as_slice() {
        height_bars(heights, &metrics.heights, scale)?;
        temperature_bars(temperatures, &metrics.temperatures, scale)?;
        timing_bars(timings, summary, scale)?;
        summary_panel(text, summary, scale)?;
    }

    root.present()
}

fn height_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    stats: &[HeightStat],
    scale: Scale,
) -> DrawResult<DB> {
    let mut chart = ChartBuilder::on(area)
        .caption("Calculation time by height", scale.font(12.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(50.0))
        .build_cartesian_2d(
            height_range(stats),
            0.0..upper_bound(stats.iter().map(|s| s.timings.avg_time)),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Height (m)")
        .y_desc("Average time (ms)")
        .label_style(scale.font(9.0))
        .axis_desc_style(scale.font(10.0))
        .draw()?;

    chart.draw_series(stats.iter().map(|stat| height_bar(stat, SKY_BLUE)))?;
    Ok(())
}

fn temperature_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    stats: &[TemperatureStat],
    scale: Scale,
) -> DrawResult<DB> {
    let labels: Vec<String> = stats.iter().map(TemperatureStat::label).collect();
    let mut chart = ChartBuilder::on(area)
        .caption("Calculation time by temperature", scale.font(12.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(50.0))
        .build_cartesian_2d(
            (0..stats.len().saturating_sub(1)).into_segmented(),
            0.0..upper_bound(stats.iter().map(|s| s.timings.avg_time)),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len())
        .x_label_formatter(&|bucket| bucket_label(&labels, bucket))
        .x_desc("Temperature range (°C)")
        .y_desc("Average time (ms)")
        .label_style(scale.font(9.0))
        .axis_desc_style(scale.font(10.0))
        .draw()?;

    let margin = scale.px(3.0) as u32;
    chart.draw_series(
        stats
            .iter()
            .enumerate()
            .map(|(i, stat)| segment_bar(i, stat.timings.avg_time, LIGHT_GREEN, margin)),
    )?;
    Ok(())
}

fn timing_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    summary: &Summary,
    scale: Scale,
) -> DrawResult<DB> {
    let labels = ["Average", "Minimum", "Maximum"].map(String::from);
    let values = [summary.avg_time_ms, summary.min_time_ms, summary.max_time_ms];

    let mut chart = ChartBuilder::on(area)
        .caption("Execution time", scale.font(12.0))
        .margin(scale.px(8.0))
        .x_label_area_size(scale.px(30.0))
        .y_label_area_size(scale.px(50.0))
        .build_cartesian_2d(
            (0..values.len() - 1).into_segmented(),
            0.0..upper_bound(values.iter().copied()) * 1.05,
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len())
        .x_label_formatter(&|bucket| bucket_label(&labels, bucket))
        .y_desc("Time (ms)")
        .label_style(scale.font(9.0))
        .axis_desc_style(scale.font(10.0))
        .draw()?;

    let margin = scale.px(12.0) as u32;
    chart.draw_series(
        values
            .iter()
            .zip(TIMING_COLORS)
            .enumerate()
            .map(|(i, (value, color))| segment_bar(i, *value, color, margin)),
    )?;

    let value_style = TextStyle::from(scale.font(9.0)).pos(Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(values.iter().enumerate().map(|(i, value)| {
        Text::new(
            format!("{value:.4}"),
            (SegmentValue::CenterOf(i), *value),
            value_style.clone(),
        )
    }))?;
    Ok(())
}

fn summary_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    summary: &Summary,
    scale: Scale,
) -> DrawResult<DB> {
    // Keep clear of the x axis title of the chart above.
    let gap = scale.px(PANEL_GAP);
    let area = area
        .margin(gap, 0, scale.px(8.0), scale.px(8.0))
        .titled("Summary", scale.font(12.0))?;
    let style = TextStyle::from(scale.font(10.0));
    let left = scale.px(20.0);
    let top = scale.px(8.0);
    let line_height = scale.px(14.0);

    for (i, line) in summary.panel_lines().iter().enumerate() {
        area.draw_text(line, &style, (left, top + line_height * i as i32))?;
    }
    Ok(())
}

fn height_bar(stat: &HeightStat, color: RGBColor) -> Rectangle<(f64, f64)> {
    let half = HEIGHT_BAR_WIDTH / 2.0;
    Rectangle::new(
        [
            (stat.height - half, 0.0),
            (stat.height + half, stat.timings.avg_time),
        ],
        color.mix(0.7).filled(),
    )
}

fn segment_bar(
    index: usize,
    value: f64,
    color: RGBColor,
    margin: u32,
) -> Rectangle<(SegmentValue<usize>, f64)> {
    let mut bar = Rectangle::new(
        [
            (SegmentValue::Exact(index), 0.0),
            (SegmentValue::Exact(index + 1), value),
        ],
        color.mix(0.7).filled(),
    );
    bar.set_margin(0, 0, margin, margin);
    bar
}

fn legend_box(x: i32, y: i32, color: RGBColor, scale: Scale) -> Rectangle<(i32, i32)> {
    let half = scale.px(4.0);
    Rectangle::new(
        [(x, y - half), (x + 2 * half, y + half)],
        color.mix(0.7).filled(),
    )
}

fn legend_line(x: i32, y: i32, color: RGBColor, scale: Scale) -> PathElement<(i32, i32)> {
    PathElement::new(vec![(x, y), (x + scale.px(14.0), y)], color.stroke_width(2))
}

fn bucket_label(labels: &[String], bucket: &SegmentValue<usize>) -> String {
    match bucket {
        SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Axis range wide enough to hold every height bar.
fn height_range(stats: &[HeightStat]) -> std::ops::Range<f64> {
    let low = stats
        .iter()
        .map(|stat| stat.height)
        .min_by(|left, right| left.total_cmp(right))
        .unwrap_or(0.0);
    let high = stats
        .iter()
        .map(|stat| stat.height)
        .max_by(|left, right| left.total_cmp(right))
        .unwrap_or(0.0);
    low - HEIGHT_BAR_WIDTH..high + HEIGHT_BAR_WIDTH
}

/// Top of a value axis starting at zero, with some headroom.
fn upper_bound(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.1
    } else {
        1.0
    }
}

/// Boundaries of the cells centred on `centers`, which must be sorted.
fn cell_edges(centers: &[f64], default_width: f64) -> Vec<f64> {
    match centers {
        [] => Vec::new(),
        [only] => vec![only - default_width / 2.0, only + default_width / 2.0],
        [first, second, ..] => {
            let n = centers.len();
            let mut edges = Vec::with_capacity(n + 1);
            edges.push(first - (second - first) / 2.0);
            edges.extend(centers.windows(2).map(|pair| (pair[0] + pair[1]) / 2.0));
            edges.push(centers[n - 1] + (centers[n - 1] - centers[n - 2]) / 2.0);
            edges
        }
    }
}

/// Viridis colormap, `t` in `[0, 1]`.
fn viridis(t: f64) -> RGBColor {
    const STOPS: [(f64, f64, f64); 5] = [
        (68.0, 1.0, 84.0),
        (59.0, 82.0, 139.0),
        (33.0, 145.0, 140.0),
        (94.0, 201.0, 98.0),
        (253.0, 231.0, 37.0),
    ];

    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let position = t * (STOPS.len() - 1) as f64;
    let index = (position.floor() as usize).min(STOPS.len() - 2);
    let fraction = position - index as f64;

    let (r0, g0, b0) = STOPS[index];
    let (r1, g1, b1) = STOPS[index + 1];
    let lerp = |from: f64, to: f64| (from + (to - from) * fraction).round() as u8;
    RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}
