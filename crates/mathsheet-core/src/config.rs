//! Notebook settings.
//!
//! Every field has a default so a partial `config.toml` (or none at all)
//! still yields a usable configuration.

use std::time::Duration;

use mathsheet_engine::EvalLimits;
use mathsheet_engine::plot::DEFAULT_STEPS;
use mathsheet_engine::solve::SolveOptions;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotebookConfig {
    pub math: MathSettings,
    pub plot: PlotSettings,
    pub solve: SolveSettings,
    pub input: InputSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MathSettings {
    /// Per-cell evaluation deadline; 0 disables it.
    pub eval_timeout_ms: u64,
    pub max_call_depth: usize,
}

impl Default for MathSettings {
    fn default() -> Self {
        Self {
            eval_timeout_ms: 5000,
            max_call_depth: 256,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotSettings {
    pub default_steps: usize,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            default_steps: DEFAULT_STEPS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolveSettings {
    pub search_min: f64,
    pub search_max: f64,
    pub samples: usize,
    pub max_roots: usize,
}

impl Default for SolveSettings {
    fn default() -> Self {
        let options = SolveOptions::default();
        Self {
            search_min: options.search_min,
            search_max: options.search_max,
            samples: options.samples,
            max_roots: options.max_roots,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSettings {
    /// Longest accepted cell input, in characters.
    pub max_length: usize,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self { max_length: 1000 }
    }
}

impl NotebookConfig {
    pub fn eval_limits(&self) -> EvalLimits {
        EvalLimits {
            timeout: (self.math.eval_timeout_ms > 0)
                .then(|| Duration::from_millis(self.math.eval_timeout_ms)),
            max_call_depth: self.math.max_call_depth,
        }
    }

    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            search_min: self.solve.search_min,
            search_max: self.solve.search_max,
            samples: self.solve.samples,
            max_roots: self.solve.max_roots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine() {
        let config = NotebookConfig::default();
        assert_eq!(config.eval_limits(), EvalLimits::default());
        assert_eq!(config.solve_options(), SolveOptions::default());
        assert_eq!(config.plot.default_steps, 200);
        assert_eq!(config.input.max_length, 1000);
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let mut config = NotebookConfig::default();
        config.math.eval_timeout_ms = 0;
        assert_eq!(config.eval_limits().timeout, None);
    }
}
