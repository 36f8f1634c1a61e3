use std::sync::OnceLock;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mathsheet_engine::engine::format_number;
use mathsheet_engine::parse;
use mathsheet_engine::solve::{Solution, solve};
use regex::Regex;

use super::{Command, CommandContext, prefix_matcher, regex_parser};
use crate::error::{NotebookError, Result};
use crate::output::Outcome;

const FORMAT_HELP: &str = "Format: solve <equation> for <variable>\nExample: solve x^2 - 4 = 0 for x";

fn solve_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)solve\s+(.+?)\s+for\s+(\w+)").expect("solve syntax regex must compile")
    })
}

/// `solve <lhs> = <rhs> for <var>`
pub struct SolveCommand;

impl Command for SolveCommand {
    fn name(&self) -> &str {
        "solve"
    }

    fn description(&self) -> &str {
        "Solve an equation for one variable"
    }

    fn usage(&self) -> &str {
        "solve <equation> for <variable>"
    }

    fn matches(&self, input: &str) -> bool {
        prefix_matcher(input, "solve ")
    }

    fn parse_args(&self, input: &str) -> Vec<String> {
        regex_parser(solve_re(), input)
    }

    fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            let [equation, var] = ctx.args.as_slice() else {
                return Err(NotebookError::format(FORMAT_HELP));
            };
            if var.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(NotebookError::format(format!(
                    "'{}' is not a variable name.\n{}",
                    var, FORMAT_HELP
                )));
            }

            let sides: Vec<&str> = equation.split('=').collect();
            let [left, right] = sides.as_slice() else {
                return Err(NotebookError::format(
                    "The equation must have the form: expression = expression",
                ));
            };
            let expr = parse(&format!("{} - ({})", left.trim(), right.trim()))?;

            let options = ctx.state.config.solve_options();
            let limits = ctx.state.eval_limits();
            let solution = ctx
                .state
                .scopes
                .with_scope(ctx.sheet_id, |scope| solve(&expr, var, scope, &options, &limits))?;

            let text = match solution {
                Solution::Roots { roots, .. } => {
                    let roots: Vec<String> = roots.into_iter().map(format_number).collect();
                    format!("{} = {}", var, roots.join(", "))
                }
                Solution::Identity => format!("{} = any value (the equation always holds)", var),
                Solution::NoSolution => format!(
                    "No solution found for: {}\n\nThe equation may have no real solution, or its roots lie outside the search range.",
                    equation
                ),
            };
            Ok(Outcome::Text(text))
        }
        .boxed()
    }
}
