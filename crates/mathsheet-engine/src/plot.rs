//! Plot configuration parsing and sampling for `plot` cells.
//!
//! This module provides:
//! - [`PlotConfig`]: Functions to draw plus the x range (parsed from `plot {..} from a to b`)
//! - [`PlotData`]: Sampled series ready for rendering (frontend-agnostic)
//!
//! Rasterization is left to the front end; the CLI draws `PlotData` in the terminal.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_STEPS: usize = 200;

/// Fraction of the y span added above and below the sampled values.
const Y_PADDING: f64 = 0.1;

fn plot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\{([^}]+)\}\s+from\s+(-?\d*\.?\d+)\s+to\s+(-?\d*\.?\d+)$")
            .expect("plot syntax regex must compile")
    })
}

pub fn plot_help() -> String {
    [
        "Plot usage: plot {f1, f2, ...} from <xmin> to <xmax>",
        "",
        "Examples:",
        "  plot {x^2} from -5 to 5",
        "  plot {sin(x), cos(x)} from -3.14 to 3.14",
        "",
        "Functions are written in terms of x and may use anything defined in the sheet.",
    ]
    .join("\n")
}

/// Specification for a plot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotConfig {
    pub functions: Vec<String>,
    pub x_min: f64,
    pub x_max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_max: Option<f64>,
    pub steps: usize,
}

impl PlotConfig {
    /// Parse a full `plot ...` input line.
    ///
    /// Returns `None` when the trimmed text after the 5-character `plot `
    /// prefix does not match `{f1, f2} from a to b`, or when no function survives trimming.
    pub fn parse(input: &str) -> Option<Self> {
        let rest = input.get(5..)?.trim();
        let caps = plot_re().captures(rest)?;

        let functions: Vec<String> = caps[1]
            .split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        if functions.is_empty() {
            return None;
        }

        Some(PlotConfig {
            functions,
            x_min: caps[2].parse().ok()?,
            x_max: caps[3].parse().ok()?,
            y_min: None,
            y_max: None,
            steps: DEFAULT_STEPS,
        })
    }

    /// Validate that the configuration can be sampled.
    ///
    /// Returns `Ok(())` if valid, or an error message describing the problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.functions.is_empty() {
            return Err("plot needs at least one function".to_string());
        }
        if self.x_min >= self.x_max {
            return Err(format!(
                "x range is empty: from {} must be less than to {}",
                crate::engine::format_number(self.x_min),
                crate::engine::format_number(self.x_max)
            ));
        }
        if self.steps == 0 {
            return Err("steps must be at least 1".to_string());
        }
        if let (Some(lo), Some(hi)) = (self.y_min, self.y_max)
            && lo >= hi
        {
            return Err("y_min must be less than y_max".to_string());
        }
        Ok(())
    }

    /// The `steps + 1` evenly spaced x values the functions are sampled at.
    pub fn sample_points(&self) -> impl Iterator<Item = f64> + '_ {
        let dx = (self.x_max - self.x_min) / self.steps as f64;
        (0..=self.steps).map(move |i| self.x_min + dx * i as f64)
    }

    /// Sample every function through `value`, which takes the function index
    /// and an x value and returns the y value, or `None` for a bad sample.
    pub fn sample<F>(&self, mut value: F) -> Result<PlotData, String>
    where
        F: FnMut(usize, f64) -> Option<f64>,
    {
        self.validate()?;

        let mut series = Vec::with_capacity(self.functions.len());
        let mut warnings = Vec::new();

        for (index, function) in self.functions.iter().enumerate() {
            let mut points = Vec::with_capacity(self.steps + 1);
            let mut skipped = 0;
            for x in self.sample_points() {
                match value(index, x) {
                    Some(y) if y.is_finite() => points.push((x, y)),
                    _ => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(function = %function, skipped, "plot samples skipped");
                warnings.push(format!(
                    "{}: {} of {} sample(s) skipped",
                    function,
                    skipped,
                    self.steps + 1
                ));
            }
            series.push(PlotSeries {
                label: function.clone(),
                points,
            });
        }

        if series.iter().all(|s| s.points.is_empty()) {
            return Err("No data points to plot".to_string());
        }

        let (mut ymin, mut ymax) = (f64::INFINITY, f64::NEG_INFINITY);
        for (_, y) in series.iter().flat_map(|s| s.points.iter()) {
            ymin = ymin.min(*y);
            ymax = ymax.max(*y);
        }
        let padding = if ymax > ymin {
            (ymax - ymin) * Y_PADDING
        } else {
            1.0
        };

        Ok(PlotData {
            series,
            x_range: (self.x_min, self.x_max),
            y_range: (
                self.y_min.unwrap_or(ymin - padding),
                self.y_max.unwrap_or(ymax + padding),
            ),
            warnings,
        })
    }
}

/// One sampled function.
#[derive(Clone, Debug, PartialEq)]
pub struct PlotSeries {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// Prepared data for rendering a plot (frontend-agnostic).
#[derive(Clone, Debug)]
pub struct PlotData {
    pub series: Vec<PlotSeries>,
    /// X-axis range (min, max).
    pub x_range: (f64, f64),
    /// Y-axis range (min, max), padded unless fixed by the config.
    pub y_range: (f64, f64),
    /// Warnings about skipped samples.
    pub warnings: Vec<String>,
}
