use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

use super::{Command, CommandContext};
use crate::error::Result;
use crate::output::Outcome;

/// `clear`, `cls` or `reset`: forget everything defined in the sheet.
pub struct ClearCommand;

const KEYWORDS: [&str; 3] = ["clear", "cls", "reset"];

impl Command for ClearCommand {
    fn name(&self) -> &str {
        "clear"
    }

    fn aliases(&self) -> &[&'static str] {
        &["cls", "reset"]
    }

    fn description(&self) -> &str {
        "Remove every function and variable defined in this sheet"
    }

    fn usage(&self) -> &str {
        "clear"
    }

    fn matches(&self, input: &str) -> bool {
        KEYWORDS.iter().any(|k| input.eq_ignore_ascii_case(k))
    }

    fn parse_args(&self, _input: &str) -> Vec<String> {
        Vec::new()
    }

    fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
        async move {
            ctx.state.clear_sheet(ctx.sheet_id);
            debug!(sheet_id = ctx.sheet_id, "sheet cleared");
            Ok(Outcome::text(
                "Memory cleared. All functions and variables have been removed.",
            ))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::output::CellOutput;
    use crate::state::NotebookState;
    use mathsheet_engine::Value;

    #[test]
    fn test_matches_whole_input_only() {
        assert!(ClearCommand.matches("CLS"));
        assert!(ClearCommand.matches("reset"));
        assert!(!ClearCommand.matches("clear x"));
        assert!(!ClearCommand.matches("clearly"));
    }

    #[tokio::test]
    async fn test_clear_empties_only_its_sheet() {
        let registry = CommandRegistry::with_builtins();
        let state = NotebookState::default();
        for sheet in ["a", "b"] {
            state.scopes.bind(sheet, "x", Value::Number(1.0));
            state.memory.store_variable(sheet, "x", "x = 1", Value::Number(1.0));
        }

        let mut out = CellOutput::default();
        assert!(registry.try_execute("clear", "a", 3, &state, &mut out).await);
        assert!(matches!(out, CellOutput::Text(ref t) if t.starts_with("Memory cleared")));
        assert!(state.scopes.snapshot("a").is_empty());
        assert!(state.memory.get_all_symbols("a").is_empty());
        assert!(state.memory.has_symbol("b", "x"));
    }
}
