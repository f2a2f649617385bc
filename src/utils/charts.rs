//! SVG Training Curves
//!
//! Renders the per-epoch loss and accuracy series as standalone SVG line
//! charts, suitable for dropping into a report.

use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::error::Result;
use crate::utils::scalars::{series, MemorySink};

/// Chart styling constants
const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_TRAIN: &str = "#3498db";
const COLOR_TRAIN_MEAN: &str = "#9b59b6";
const COLOR_VALIDATION: &str = "#2ecc71";
const COLOR_TEST: &str = "#e74c3c";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

const GRID_LINES: usize = 5;

/// A data point for a line chart
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// A named, colored series of points
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

impl DataSeries {
    /// Build a series from `(step, value)` pairs
    pub fn from_steps(name: &str, steps: &[(usize, f64)], color: &str) -> Self {
        Self {
            name: name.to_string(),
            points: steps
                .iter()
                .map(|&(step, value)| DataPoint {
                    x: step as f64,
                    y: value,
                })
                .collect(),
            color: color.to_string(),
        }
    }
}

/// How the y axis is scaled and labelled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YScale {
    /// Fixed 0..100 with `%` tick labels
    Percent,
    /// 0..max of the data, plain tick labels
    Auto,
}

/// Render a line chart to an SVG string
pub fn render_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    scale: YScale,
) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (x_min, x_max, _, data_y_max) = find_ranges(series);
    let (x_min, x_max) = if x_min.is_finite() && x_max > x_min {
        (x_min, x_max)
    } else if x_min.is_finite() {
        (x_min - 1.0, x_min + 1.0)
    } else {
        (0.0, 1.0)
    };
    let y_min = 0.0;
    let y_max = match scale {
        YScale::Percent => 100.0_f64.max(data_y_max),
        YScale::Auto if data_y_max.is_finite() && data_y_max > 0.0 => data_y_max * 1.1,
        YScale::Auto => 1.0,
    };

    let to_x = |x: f64| MARGIN_LEFT + ((x - x_min) / (x_max - x_min)) * plot_width;
    let to_y = |y: f64| MARGIN_TOP + plot_height - ((y - y_min) / (y_max - y_min)) * plot_height;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));

    // Title
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    // Grid lines and y ticks
    for i in 0..=GRID_LINES {
        let fraction = i as f64 / GRID_LINES as f64;
        let y = MARGIN_TOP + plot_height - fraction * plot_height;
        let value = y_min + fraction * (y_max - y_min);
        let tick = match scale {
            YScale::Percent => format!("{:.0}%", value),
            YScale::Auto => format!("{:.2}", value),
        };

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, tick
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));

    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 20.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0, escape_xml(y_label)
    ));

    for series_data in series.iter().filter(|s| !s.points.is_empty()) {
        let path = series_data
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let cmd = if i == 0 { "M" } else { "L" };
                format!("{} {:.2} {:.2}", cmd, to_x(p.x), to_y(p.y))
            })
            .collect::<Vec<_>>()
            .join(" ");

        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            path, series_data.color
        ));

        for point in &series_data.points {
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                to_x(point.x),
                to_y(point.y),
                series_data.color
            ));
        }
    }

    // X ticks come from the longest series
    if let Some(longest) = series.iter().max_by_key(|s| s.points.len()) {
        for point in &longest.points {
            svg.push_str(&format!(
                r#"<text x="{:.2}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.0}</text>"#,
                to_x(point.x), MARGIN_TOP + plot_height + 20.0, COLOR_TEXT, point.x
            ));
        }
    }

    // Legend
    let mut legend_y = MARGIN_TOP + 10.0;
    for series_data in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 140.0,
            legend_y,
            series_data.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 120.0, legend_y + 12.0, COLOR_TEXT, escape_xml(&series_data.name)
        ));
        legend_y += 25.0;
    }

    svg.push_str("</svg>");
    svg
}

/// Render a line chart and write it to `output_path`
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    scale: YScale,
    output_path: &Path,
) -> Result<()> {
    fs::write(
        output_path,
        render_line_chart(title, x_label, y_label, series, scale),
    )?;
    Ok(())
}

/// Write `loss.svg` and `accuracy.svg` for a recorded run into `output_dir`
///
/// Test points sit at step `epochs`, so they land just right of the last
/// validation point.
pub fn write_training_charts(sink: &MemorySink, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;

    let loss_series: Vec<DataSeries> = [
        (series::TRAIN_LOSS, "Train (last batch)", COLOR_TRAIN),
        (series::TRAIN_MEAN_LOSS, "Train (mean)", COLOR_TRAIN_MEAN),
        (series::VALIDATION_LOSS, "Validation", COLOR_VALIDATION),
        (series::TEST_LOSS, "Test", COLOR_TEST),
    ]
    .iter()
    .filter(|(key, _, _)| !sink.series(key).is_empty())
    .map(|(key, name, color)| DataSeries::from_steps(name, sink.series(key), color))
    .collect();

    let accuracy_series: Vec<DataSeries> = [
        (series::TRAIN_ACCURACY, "Train", COLOR_TRAIN),
        (series::VALIDATION_ACCURACY, "Validation", COLOR_VALIDATION),
        (series::TEST_ACCURACY, "Test", COLOR_TEST),
    ]
    .iter()
    .filter(|(key, _, _)| !sink.series(key).is_empty())
    .map(|(key, name, color)| DataSeries::from_steps(name, sink.series(key), color))
    .collect();

    let loss_path = output_dir.join("loss.svg");
    generate_line_chart(
        "Cross-Entropy Loss per Epoch",
        "Epoch",
        "Loss",
        &loss_series,
        YScale::Auto,
        &loss_path,
    )?;

    let accuracy_path = output_dir.join("accuracy.svg");
    generate_line_chart(
        "Accuracy per Epoch",
        "Epoch",
        "Accuracy (%)",
        &accuracy_series,
        YScale::Percent,
        &accuracy_path,
    )?;

    Ok(vec![loss_path, accuracy_path])
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for s in series {
        for p in &s.points {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    (x_min, x_max, y_min, y_max)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
