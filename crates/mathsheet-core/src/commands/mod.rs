//! Command registry for notebook cells.
//!
//! This module provides:
//! - [`Command`]: Matcher/parser/executor triple for one command
//! - [`CommandRegistry`]: Ordered registry; first matching command wins
//! - Argument helpers shared by the built-in commands
//!
//! Commands are checked before expression evaluation, so a command keyword
//! shadows a variable of the same name.

mod clear;
mod derive;
mod help;
mod matrix;
mod plot;
mod script;
mod solve;

pub use clear::ClearCommand;
pub use derive::DeriveCommand;
pub use help::HelpCommand;
pub use matrix::MatrixCommand;
pub use plot::PlotCommand;
pub use script::{ScriptCommand, load_script_commands};
pub use solve::SolveCommand;

use futures_util::future::BoxFuture;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{NotebookError, Result};
use crate::output::{Outcome, OutputSink};
use crate::state::NotebookState;

/// Everything an executor gets to see about one invocation.
pub struct CommandContext<'a> {
    pub input: &'a str,
    pub sheet_id: &'a str,
    pub cell_number: usize,
    pub args: Vec<String>,
    /// The parsed arguments joined by single spaces.
    pub raw_args: String,
    pub state: &'a NotebookState,
    pub registry: &'a CommandRegistry,
}

pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    /// Alternative names accepted by `help <name>`.
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    fn description(&self) -> &str;
    fn usage(&self) -> &str;

    /// Whether this command owns the (trimmed) input line.
    fn matches(&self, input: &str) -> bool;

    fn parse_args(&self, input: &str) -> Vec<String>;

    /// Run the command. A returned error is reported once through the sink's
    /// `error`; a returned outcome through exactly one of its terminal calls.
    fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>>;

    /// Custom help text replacing the generated one.
    fn help(&self) -> Option<String> {
        None
    }
}

/// Case-insensitive prefix test.
pub fn prefix_matcher(input: &str, prefix: &str) -> bool {
    input
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Whitespace-separated words after the command word.
pub fn simple_parser(input: &str) -> Vec<String> {
    input
        .split_whitespace()
        .skip(1)
        .map(str::to_string)
        .collect()
}

/// Everything after the command word as one argument (none when empty).
pub fn rest_parser(input: &str) -> Vec<String> {
    let rest: Vec<&str> = input.split_whitespace().skip(1).collect();
    if rest.is_empty() {
        Vec::new()
    } else {
        vec![rest.join(" ")]
    }
}

/// Capture groups of `re`, or nothing when it does not match.
pub fn regex_parser(re: &Regex, input: &str) -> Vec<String> {
    re.captures(input)
        .map(|caps| {
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

/// Ordered command list. Registration order is matching order.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with plot, help, clear, solve, matrix and derive, in that order.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PlotCommand));
        registry.register(Box::new(HelpCommand));
        registry.register(Box::new(ClearCommand));
        registry.register(Box::new(SolveCommand));
        registry.register(Box::new(MatrixCommand));
        registry.register(Box::new(DeriveCommand));
        registry
    }

    /// Add a command. A command whose name is already registered replaces the
    /// old entry in its original position.
    pub fn register(&mut self, command: Box<dyn Command>) {
        let existing = self
            .commands
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(command.name()));
        match existing {
            Some(index) => {
                warn!(command = command.name(), "replacing previously registered command");
                self.commands[index] = command;
            }
            None => {
                info!(
                    command = command.name(),
                    aliases = ?command.aliases(),
                    "registered command"
                );
                self.commands.push(command);
            }
        }
    }

    pub fn commands(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.iter().map(|c| c.as_ref())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn find_matching_command(&self, input: &str) -> Option<&dyn Command> {
        let input = input.trim();
        self.commands().find(|c| c.matches(input))
    }

    /// Look a command up by name or alias, ignoring case.
    pub fn resolve(&self, name: &str) -> Option<&dyn Command> {
        self.commands().find(|c| {
            c.name().eq_ignore_ascii_case(name)
                || c.aliases().iter().any(|a| a.eq_ignore_ascii_case(name))
        })
    }

    /// Run the first matching command. Returns false when nothing matched, in
    /// which case the caller evaluates the input as an expression. A failing
    /// command still counts as handled.
    pub async fn try_execute(
        &self,
        input: &str,
        sheet_id: &str,
        cell_number: usize,
        state: &NotebookState,
        sink: &mut dyn OutputSink,
    ) -> bool {
        let input = input.trim();
        let Some(command) = self.find_matching_command(input) else {
            return false;
        };

        let args = command.parse_args(input);
        let ctx = CommandContext {
            input,
            sheet_id,
            cell_number,
            raw_args: args.join(" "),
            args,
            state,
            registry: self,
        };

        debug!(command = command.name(), sheet_id, cell_number, "executing command");
        match command.execute(ctx).await {
            Ok(outcome) => outcome.deliver(sink),
            Err(NotebookError::CommandFormat(message)) => sink.error(&message),
            Err(err) => sink.error(&format!("Error in command '{}': {}", command.name(), err)),
        }
        true
    }

    pub fn general_help(&self) -> String {
        if self.commands.is_empty() {
            return "No commands registered.".to_string();
        }

        let mut help = String::from("Available commands:\n\n");
        for command in self.commands() {
            let aliases = if command.aliases().is_empty() {
                String::new()
            } else {
                format!(" ({})", command.aliases().join(", "))
            };
            help.push_str(&format!("{}{}\n", command.name(), aliases));
            help.push_str(&format!("  {}\n", command.description()));
            help.push_str(&format!("  Usage: {}\n\n", command.usage()));
        }
        help
    }

    pub fn command_help(&self, name: &str) -> String {
        let Some(command) = self.resolve(name) else {
            return format!("Command '{}' not found.", name);
        };
        if let Some(help) = command.help() {
            return help;
        }

        let mut help = format!("Help: {}\n\n", command.name());
        help.push_str(&format!("Description: {}\n", command.description()));
        help.push_str(&format!("Usage: {}\n", command.usage()));
        if !command.aliases().is_empty() {
            help.push_str(&format!("Aliases: {}\n", command.aliases().join(", ")));
        }
        help
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CellOutput;
    use futures_util::FutureExt;

    struct Echo {
        name: &'static str,
        reply: &'static str,
    }

    impl Command for Echo {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Echo a fixed reply"
        }
        fn usage(&self) -> &str {
            "echo"
        }
        fn matches(&self, input: &str) -> bool {
            prefix_matcher(input, "echo")
        }
        fn parse_args(&self, input: &str) -> Vec<String> {
            simple_parser(input)
        }
        fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
            async move { Ok(Outcome::text(format!("{} {}", self.reply, ctx.raw_args))) }.boxed()
        }
    }

    struct Failing;

    impl Command for Failing {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn usage(&self) -> &str {
            "fail"
        }
        fn matches(&self, input: &str) -> bool {
            input == "fail"
        }
        fn parse_args(&self, _input: &str) -> Vec<String> {
            Vec::new()
        }
        fn execute<'a>(&'a self, _ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
            async move { Err(NotebookError::External("backend exploded".into())) }.boxed()
        }
    }

    #[test]
    fn test_parsers() {
        assert_eq!(simple_parser("matrix det  [[1]]"), vec!["det", "[[1]]"]);
        assert_eq!(rest_parser("plot {x} from 0 to 1"), vec!["{x} from 0 to 1"]);
        assert!(rest_parser("plot").is_empty());
        let re = Regex::new(r"(?i)solve\s+(.+?)\s+for\s+(\w+)").unwrap();
        assert_eq!(regex_parser(&re, "solve x = 1 for x"), vec!["x = 1", "x"]);
        assert!(regex_parser(&re, "solve x").is_empty());
    }

    #[test]
    fn test_prefix_matcher_ignores_case() {
        assert!(prefix_matcher("PLOT {x}", "plot "));
        assert!(!prefix_matcher("plo", "plot "));
        assert!(!prefix_matcher("plotx", "plot "));
    }

    #[test]
    fn test_duplicate_registration_replaces_in_place() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Echo { name: "echo", reply: "first" }));
        registry.register(Box::new(Failing));
        registry.register(Box::new(Echo { name: "ECHO", reply: "second" }));
        let names: Vec<&str> = registry.commands().map(|c| c.name()).collect();
        assert_eq!(names, vec!["ECHO", "fail"]);
    }

    #[tokio::test]
    async fn test_try_execute_delivers_outcome() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Echo { name: "echo", reply: "got" }));
        let state = NotebookState::default();
        let mut out = CellOutput::default();
        assert!(registry.try_execute("echo a  b", "s", 1, &state, &mut out).await);
        assert_eq!(out, CellOutput::Text("got a b".into()));

        let mut out = CellOutput::default();
        assert!(!registry.try_execute("1 + 1", "s", 1, &state, &mut out).await);
        assert_eq!(out, CellOutput::Empty);
    }

    #[tokio::test]
    async fn test_failed_command_is_still_handled() {
        let mut registry = CommandRegistry::new();
        registry.register(Box::new(Failing));
        let state = NotebookState::default();
        let mut out = CellOutput::default();
        assert!(registry.try_execute("fail", "s", 1, &state, &mut out).await);
        assert_eq!(
            out,
            CellOutput::Error("Error in command 'fail': backend exploded".into())
        );
    }

    #[test]
    fn test_help_resolves_aliases() {
        let registry = CommandRegistry::with_builtins();
        assert_eq!(registry.command_help("CLS"), registry.command_help("clear"));
        assert!(registry.command_help("clear").contains("Aliases: cls, reset"));
        assert_eq!(registry.command_help("nope"), "Command 'nope' not found.");
        assert!(registry.command_help("plot").starts_with("Plot usage"));
    }

    #[test]
    fn test_general_help_lists_in_order() {
        let registry = CommandRegistry::with_builtins();
        let help = registry.general_help();
        let plot = help.find("plot").unwrap();
        let derive = help.find("derive (d/dx, derivative)").unwrap();
        assert!(plot < derive);
        assert!(help.contains("help (?)"));
        assert_eq!(CommandRegistry::new().general_help(), "No commands registered.");
    }
}
