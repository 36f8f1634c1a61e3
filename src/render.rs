//! Terminal rendering of cell outputs.

use mathsheet_core::{CellOutput, Dispatcher, PlotConfig};
use mathsheet_engine::engine::format_number;
use mathsheet_engine::plot::PlotData;
use textplots::{AxisBuilder, Chart, LabelBuilder, LabelFormat, LineStyle, Plot, Shape};

use crate::config::DisplaySettings;

/// Text shown for one cell's output.
pub fn render_output(
    output: &CellOutput,
    sheet_id: &str,
    dispatcher: &Dispatcher,
    display: &DisplaySettings,
) -> String {
    match output {
        CellOutput::Plot(config) => render_plot(config, sheet_id, dispatcher, display),
        other => other.display_text(),
    }
}

fn render_plot(
    config: &PlotConfig,
    sheet_id: &str,
    dispatcher: &Dispatcher,
    display: &DisplaySettings,
) -> String {
    let title = format!(
        "plot {{{}}} from {} to {}",
        config.functions.join(", "),
        format_number(config.x_min),
        format_number(config.x_max)
    );

    // textplots uses a Braille canvas where one terminal character is 2x4 points.
    let width = display.plot_width.saturating_mul(2);
    let height = display.plot_height.saturating_mul(4);
    if width < 32 || height < 3 {
        return format!("{}\nTerminal plot size too small", title);
    }

    match dispatcher.sample_plot(sheet_id, config) {
        Ok(data) => {
            let mut parts = vec![title, render_textplots(&data, width, height)];
            if data.series.len() > 1 {
                let labels: Vec<&str> = data.series.iter().map(|s| s.label.as_str()).collect();
                parts.push(format!("Functions: {}", labels.join(", ")));
            }
            if !data.warnings.is_empty() {
                parts.push(format!("Warning: {}", data.warnings.join("; ")));
            }
            parts.join("\n")
        }
        Err(e) => format!("{}\n[Error]: {}", title, e),
    }
}

fn add_series<'a>(chart: &'a mut Chart<'a>, shapes: &'a [Shape<'a>]) -> &'a mut Chart<'a> {
    match shapes.split_first() {
        Some((first, rest)) => add_series(chart.lineplot(first), rest),
        None => chart,
    }
}

/// Render every series of `data` onto one Braille chart.
fn render_textplots(data: &PlotData, width: u32, height: u32) -> String {
    let (xmin, xmax) = data.x_range;
    let (ymin, ymax) = data.y_range;
    let span_x = (xmax - xmin) as f32;
    let span_y = (ymax - ymin) as f32;

    // Shift points so minimums map to 0 (textplots draws axes at x=0, y=0)
    let shifted: Vec<Vec<(f32, f32)>> = data
        .series
        .iter()
        .map(|series| {
            series
                .points
                .iter()
                .map(|(x, y)| ((x - xmin) as f32, (y - ymin) as f32))
                .filter(|(_, y)| *y >= 0.0 && *y <= span_y)
                .collect()
        })
        .collect();
    let shapes: Vec<Shape> = shifted.iter().map(|points| Shape::Lines(points)).collect();

    let mut chart = Chart::new_with_y_range(width, height, 0.0, span_x, 0.0, span_y);
    let chart = chart
        .x_label_format(LabelFormat::Custom(Box::new(move |v| {
            format!("{:.1}", v as f64 + xmin)
        })))
        .y_label_format(LabelFormat::Custom(Box::new(move |v| {
            format!("{:.1}", v as f64 + ymin)
        })))
        .x_axis_style(LineStyle::Solid)
        .y_axis_style(LineStyle::Solid);
    let chart = add_series(chart, &shapes);
    chart.borders();
    chart.axis();
    chart.figures();
    chart.frame()
}
