use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mathsheet_engine::plot::{PlotConfig, plot_help};

use super::{Command, CommandContext, prefix_matcher, rest_parser};
use crate::error::{NotebookError, Result};
use crate::output::Outcome;

/// `plot {f1, f2, ...} from a to b`
pub struct PlotCommand;

impl Command for PlotCommand {
    fn name(&self) -> &str {
        "plot"
    }

    fn description(&self) -> &str {
        "Plot one or more functions of x"
    }

    fn usage(&self) -> &str {
        "plot {f1, f2, ...} from <xmin> to <xmax>"
    }

    fn matches(&self, input: &str) -> bool {
        prefix_matcher(input, "plot ")
    }

    fn parse_args(&self, input: &str) -> Vec<String> {
        rest_parser(input)
    }

    fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            let Some(mut config) = PlotConfig::parse(ctx.input) else {
                return Err(NotebookError::format(format!(
                    "Invalid plot format.\n\n{}",
                    plot_help()
                )));
            };
            config.steps = ctx.state.config.plot.default_steps;
            config
                .validate()
                .map_err(|e| NotebookError::format(format!("{}\n\n{}", e, plot_help())))?;
            Ok(Outcome::Plot(config))
        }
        .boxed()
    }

    fn help(&self) -> Option<String> {
        Some(plot_help())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::output::CellOutput;
    use crate::state::NotebookState;

    async fn run(input: &str) -> CellOutput {
        let registry = CommandRegistry::with_builtins();
        let state = NotebookState::default();
        let mut out = CellOutput::default();
        assert!(registry.try_execute(input, "s", 1, &state, &mut out).await);
        out
    }

    #[tokio::test]
    async fn test_plot_outcome() {
        let CellOutput::Plot(config) = run("plot {x^2, sin(x)} from -5 to 5").await else {
            panic!("expected a plot");
        };
        assert_eq!(config.functions, vec!["x^2", "sin(x)"]);
        assert_eq!((config.x_min, config.x_max, config.steps), (-5.0, 5.0, 200));
    }

    #[tokio::test]
    async fn test_bad_plot_reports_usage() {
        let CellOutput::Error(message) = run("plot x^2 from 0 to 1").await else {
            panic!("expected an error");
        };
        assert!(message.starts_with("Invalid plot format."));
        assert!(message.contains("Plot usage"));
    }

    #[tokio::test]
    async fn test_reversed_range_is_rejected() {
        let CellOutput::Error(message) = run("plot {x} from 5 to -5").await else {
            panic!("expected an error");
        };
        assert!(message.contains("x range is empty"));
    }
}
