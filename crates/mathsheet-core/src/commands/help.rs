use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use super::{Command, CommandContext};
use crate::error::Result;
use crate::output::Outcome;

/// `help`, `?` and `help <command>`
pub struct HelpCommand;

impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn aliases(&self) -> &[&'static str] {
        &["?"]
    }

    fn description(&self) -> &str {
        "Show help for commands and the symbols defined in this sheet"
    }

    fn usage(&self) -> &str {
        "help [command] | ?"
    }

    fn matches(&self, input: &str) -> bool {
        let lower = input.to_lowercase();
        lower == "help" || lower == "?" || lower.starts_with("help ")
    }

    fn parse_args(&self, input: &str) -> Vec<String> {
        input
            .split_whitespace()
            .nth(1)
            .map(|target| vec![target.to_string()])
            .unwrap_or_default()
    }

    fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            let text = match ctx.args.first() {
                Some(target) => ctx.registry.command_help(target),
                None => format!(
                    "{}\n---\n\n{}",
                    ctx.registry.general_help(),
                    ctx.state.memory.symbols_summary(ctx.sheet_id)
                ),
            };
            Ok(Outcome::Text(text))
        }
        .boxed()
    }
}
