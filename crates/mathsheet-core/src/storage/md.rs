//! Markdown export functionality

use crate::dispatcher::Dispatcher;
use crate::notebook::{Cell, SheetInfo};
use crate::output::CellOutput;
use mathsheet_engine::engine::format_number;
use mathsheet_engine::plot::{PlotConfig, PlotData};
use std::io::Write;
use std::path::Path;

const CHART_HEIGHT: usize = 12;
const CHART_WIDTH: usize = 60;
const SERIES_MARKERS: [char; 4] = ['*', '+', 'o', 'x'];

/// Write a sheet's cells to a markdown file, one `In [n]` / `Out [n]` pair
/// per cell. Plot cells are sampled against the sheet and drawn as ASCII.
pub fn write_markdown(
    path: &Path,
    sheet: &SheetInfo,
    cells: &[Cell],
    dispatcher: &Dispatcher,
) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# {}", sheet.name)?;
    writeln!(file)?;

    if cells.is_empty() {
        writeln!(file, "*Empty sheet*")?;
        return Ok(());
    }

    for cell in cells {
        writeln!(file, "**In [{}]:**", cell.cell_number)?;
        writeln!(file)?;
        writeln!(file, "```")?;
        writeln!(file, "{}", cell.content)?;
        writeln!(file, "```")?;
        writeln!(file)?;
        writeln!(file, "**Out [{}]:**", cell.cell_number)?;
        writeln!(file)?;

        match &cell.output {
            CellOutput::Empty => {}
            CellOutput::Image(url) => writeln!(file, "![Out [{}]]({})", cell.cell_number, url)?,
            CellOutput::Plot(config) => {
                writeln!(file, "```")?;
                render_plot_ascii(&mut file, config, &sheet.id, dispatcher)?;
                writeln!(file, "```")?;
            }
            other => {
                writeln!(file, "```")?;
                writeln!(file, "{}", other.display_text())?;
                writeln!(file, "```")?;
            }
        }
        writeln!(file)?;
    }

    Ok(())
}

/// Render a plot as ASCII art
fn render_plot_ascii<W: Write>(
    w: &mut W,
    config: &PlotConfig,
    sheet_id: &str,
    dispatcher: &Dispatcher,
) -> std::io::Result<()> {
    writeln!(
        w,
        "plot {{{}}} from {} to {}",
        config.functions.join(", "),
        format_number(config.x_min),
        format_number(config.x_max)
    )?;

    match dispatcher.sample_plot(sheet_id, config) {
        Ok(data) => {
            render_line_chart(w, &data)?;
            for (series, marker) in data.series.iter().zip(SERIES_MARKERS.iter().cycle()) {
                writeln!(w, "{} {}", marker, series.label)?;
            }
            for warning in &data.warnings {
                writeln!(w, "Note: {}", warning)?;
            }
        }
        Err(e) => {
            writeln!(w, "Error rendering chart: {}", e)?;
        }
    }

    Ok(())
}

/// Render every series onto one character grid.
fn render_line_chart<W: Write>(w: &mut W, data: &PlotData) -> std::io::Result<()> {
    let (x_min, x_max) = data.x_range;
    let (y_min, y_max) = data.y_range;
    let x_span = x_max - x_min;
    let y_span = y_max - y_min;

    let mut grid = vec![vec![' '; CHART_WIDTH]; CHART_HEIGHT];
    for (series, marker) in data.series.iter().zip(SERIES_MARKERS.iter().cycle()) {
        for (x, y) in &series.points {
            if *y < y_min || *y > y_max {
                continue;
            }
            let col = (((x - x_min) / x_span) * (CHART_WIDTH - 1) as f64).round() as usize;
            let row = if y_span > 0.0 {
                (((y - y_min) / y_span) * (CHART_HEIGHT - 1) as f64).round() as usize
            } else {
                CHART_HEIGHT / 2
            };
            if col < CHART_WIDTH && row < CHART_HEIGHT {
                grid[row][col] = *marker;
            }
        }
    }

    // Print from top to bottom
    for row in (0..CHART_HEIGHT).rev() {
        let y_val = y_min + (row as f64 / (CHART_HEIGHT - 1) as f64) * y_span;
        write!(w, "{:>8.2} |", y_val)?;
        let line: String = grid[row].iter().collect();
        writeln!(w, "{}", line.trim_end())?;
    }

    write!(w, "         +")?;
    writeln!(w, "{}", "-".repeat(CHART_WIDTH))?;
    writeln!(
        w,
        "          {:<30}{:>30}",
        format_number(x_min),
        format_number(x_max)
    )?;

    Ok(())
}
