use std::sync::OnceLock;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mathsheet_engine::calculus::{derivative, inline_functions, simplify};
use mathsheet_engine::{NodeKind, parse};
use regex::Regex;

use super::{Command, CommandContext};
use crate::error::{NotebookError, Result};
use crate::output::Outcome;

const FORMAT_HELP: &str = "Format: derive <function> [variable]\nExample: derive x^2+3*x";

fn derive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:derive|d/dx)\s+(.+)").expect("derive syntax regex must compile"))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// `derive <expr> [var]` or `d/dx <expr> [var]`
pub struct DeriveCommand;

impl Command for DeriveCommand {
    fn name(&self) -> &str {
        "derive"
    }

    fn aliases(&self) -> &[&'static str] {
        &["d/dx", "derivative"]
    }

    fn description(&self) -> &str {
        "Symbolic derivative of an expression"
    }

    fn usage(&self) -> &str {
        "derive <function> [variable]"
    }

    fn matches(&self, input: &str) -> bool {
        let lower = input.to_lowercase();
        lower.starts_with("derive ") || lower.starts_with("d/dx ")
    }

    fn parse_args(&self, input: &str) -> Vec<String> {
        derive_re()
            .captures(input)
            .map(|caps| caps[1].split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            let Some(source) = ctx.args.first() else {
                return Err(NotebookError::format(FORMAT_HELP));
            };
            let var = ctx.args.get(1).map(String::as_str).unwrap_or("x");
            if !is_identifier(var) || ctx.args.len() > 2 {
                return Err(NotebookError::format(format!(
                    "'{}' is not a variable name. Write the expression without spaces.\n{}",
                    ctx.args[1..].join(" "),
                    FORMAT_HELP
                )));
            }

            let expr = parse(source)?;
            if expr.kind() != NodeKind::Other && expr.kind() != NodeKind::SymbolReference {
                return Err(NotebookError::format(format!(
                    "derive expects an expression, not a definition.\n{}",
                    FORMAT_HELP
                )));
            }

            let expr = ctx
                .state
                .scopes
                .with_scope(ctx.sheet_id, |scope| inline_functions(&expr, scope))?;
            let raw = derivative(&expr, var).map_err(NotebookError::external)?;
            let simplified = simplify(&raw);

            Ok(Outcome::Text(format!(
                "Derivative of {} with respect to {}:\n\n{}\n\nSimplified: {}",
                source, var, raw, simplified
            )))
        }
        .boxed()
    }
}
