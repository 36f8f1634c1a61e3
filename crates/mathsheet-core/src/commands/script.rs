//! Commands defined in Rhai scripts.
//!
//! Every `fn cmd_<name>(args)` in a loaded script becomes a command `<name>`.
//! The function receives the words after the command name as an array of
//! strings and returns what the cell shows:
//!
//! ```rhai
//! fn cmd_twice(args) {
//!     "2 * " + args[0] + " = " + math("2 * " + args[0])
//! }
//! ```

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mathsheet_engine::{EvalLimits, Scope, evaluate, parse};
use rhai::{AST, Array, Dynamic, Engine, EvalAltResult, Map};
use tracing::warn;

use super::{Command, CommandContext, CommandRegistry, prefix_matcher, simple_parser};
use crate::error::{NotebookError, Result};
use crate::output::Outcome;

const COMMAND_PREFIX: &str = "cmd_";

/// Evaluate `expr` in an empty scope and format the result.
fn math(expr: &str) -> std::result::Result<String, Box<EvalAltResult>> {
    let parsed = parse(expr).map_err(|e| e.to_string())?;
    let value = evaluate(&parsed, &Scope::new(), &EvalLimits::default()).map_err(|e| e.to_string())?;
    Ok(value.to_string())
}

/// Create a Rhai engine with the notebook helpers registered.
pub fn create_script_engine() -> Engine {
    let mut engine = Engine::new();
    engine.register_fn("math", math);
    engine
}

/// Compile `script` and collect its `cmd_*` functions as commands.
pub fn load_script_commands(script: &str) -> Result<Vec<ScriptCommand>> {
    let engine = Arc::new(create_script_engine());
    let ast = engine
        .compile(script)
        .map_err(|e| NotebookError::RhaiCompile(format!("Error in custom commands: {}", e)))?;
    let ast = Arc::new(ast);

    let commands = ast
        .iter_functions()
        .filter(|f| f.params.len() == 1)
        .filter_map(|f| f.name.strip_prefix(COMMAND_PREFIX).map(str::to_string))
        .filter(|name| !name.is_empty())
        .map(|name| ScriptCommand {
            function: format!("{}{}", COMMAND_PREFIX, name),
            usage: format!("{} [args...]", name),
            description: format!("Script command ({}{})", COMMAND_PREFIX, name),
            name,
            engine: Arc::clone(&engine),
            ast: Arc::clone(&ast),
        })
        .collect();
    Ok(commands)
}

/// A command backed by a Rhai function.
pub struct ScriptCommand {
    name: String,
    function: String,
    description: String,
    usage: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl ScriptCommand {
    fn call(&self, args: &[String]) -> Result<Outcome> {
        let args: Array = args.iter().cloned().map(Dynamic::from).collect();
        let result: Dynamic =
            self.engine
                .call_fn(&mut rhai::Scope::new(), &self.ast, &self.function, (args,))?;
        Ok(to_outcome(result))
    }
}

fn to_outcome(result: Dynamic) -> Outcome {
    if result.is_unit() {
        return Outcome::text("");
    }
    if result.is_map() {
        let map = result.clone().cast::<Map>();
        if let Some(url) = map.get("image") {
            return Outcome::Image(url.to_string());
        }
        if let Some(text) = map.get("text") {
            return Outcome::Text(text.to_string());
        }
    }
    Outcome::Text(result.to_string())
}

impl Command for ScriptCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn usage(&self) -> &str {
        &self.usage
    }

    fn matches(&self, input: &str) -> bool {
        input.eq_ignore_ascii_case(&self.name) || prefix_matcher(input, &format!("{} ", self.name))
    }

    fn parse_args(&self, input: &str) -> Vec<String> {
        simple_parser(input)
    }

    fn execute<'a>(&'a self, ctx: CommandContext<'a>) -> BoxFuture<'a, Result<Outcome>> {
        async move { self.call(&ctx.args) }.boxed()
    }
}

impl CommandRegistry {
    /// Append the commands of a Rhai script. Names that are already taken are
    /// skipped so built-ins keep precedence. Returns how many were added.
    pub fn load_script(&mut self, script: &str) -> Result<usize> {
        let mut added = 0;
        for command in load_script_commands(script)? {
            if self.resolve(command.name()).is_some() {
                warn!(command = command.name(), "script command shadows an existing command, skipped");
                continue;
            }
            self.register(Box::new(command));
            added += 1;
        }
        Ok(added)
    }
}
