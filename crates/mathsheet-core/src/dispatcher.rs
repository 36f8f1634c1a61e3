//! Evaluation dispatcher: turns one line of cell input into one output.
//!
//! Order of business for every input:
//! 1. Empty input shows an empty result.
//! 2. Registered commands get the first look.
//! 3. Otherwise the input is parsed and classified by its top-level node:
//!    function definition, assignment, bare symbol or plain expression.
//!
//! Failures are reported through the sink as `[Error]: ...` and leave the
//! sheet's scope and symbol memory exactly as they were.

use std::collections::HashMap;
use std::time::Instant;

use mathsheet_engine::builtins::is_reserved;
use mathsheet_engine::engine::{evaluate_since, make_function};
use mathsheet_engine::plot::{PlotConfig, PlotData};
use mathsheet_engine::{Expr, MathError, Value, evaluate, parse};
use tracing::debug;

use crate::commands::CommandRegistry;
use crate::config::NotebookConfig;
use crate::output::{Outcome, OutputSink};
use crate::state::NotebookState;

/// Name of the free variable in plotted functions.
const PLOT_VARIABLE: &str = "x";

pub struct Dispatcher {
    state: NotebookState,
    registry: CommandRegistry,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(NotebookConfig::default())
    }
}

impl Dispatcher {
    /// Dispatcher with the built-in commands registered.
    pub fn new(config: NotebookConfig) -> Self {
        Self::with_registry(config, CommandRegistry::with_builtins())
    }

    pub fn with_registry(config: NotebookConfig, registry: CommandRegistry) -> Self {
        Dispatcher {
            state: NotebookState::new(config),
            registry,
        }
    }

    pub fn state(&self) -> &NotebookState {
        &self.state
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &NotebookConfig {
        &self.state.config
    }

    /// Evaluate one cell. Exactly one sink call is made.
    pub async fn process_input(
        &self,
        input: &str,
        sheet_id: &str,
        cell_number: usize,
        sink: &mut dyn OutputSink,
    ) {
        let input = input.trim();
        if input.is_empty() {
            sink.text("");
            return;
        }

        if self
            .registry
            .try_execute(input, sheet_id, cell_number, &self.state, sink)
            .await
        {
            return;
        }

        match self.evaluate_line(input, sheet_id) {
            Ok(outcome) => outcome.deliver(sink),
            Err(err) => {
                debug!(sheet_id, cell_number, error = %err, "evaluation failed");
                sink.error(&err.to_string());
            }
        }
    }

    fn evaluate_line(&self, input: &str, sheet_id: &str) -> Result<Outcome, MathError> {
        let expr = parse(input)?;
        let limits = self.state.eval_limits();
        let scopes = &self.state.scopes;
        let memory = &self.state.memory;

        match expr {
            Expr::FunctionAssign { name, params, body } => {
                check_assignable(&name)?;
                debug!(sheet_id, name = %name, "defining function");
                scopes.bind(sheet_id, &name, make_function(&name, &params, &body));
                memory.store_function(sheet_id, &name, input, params);
                Ok(Outcome::text(input))
            }
            Expr::Assign { name, value } => {
                check_assignable(&name)?;
                let value = scopes.with_scope(sheet_id, |scope| evaluate(&value, scope, &limits))?;
                debug!(sheet_id, name = %name, "assigning variable");
                scopes.bind(sheet_id, &name, value.clone());
                memory.store_variable(sheet_id, &name, input, value.clone());
                Ok(Outcome::Text(format!("{} = {}", name, value)))
            }
            Expr::Symbol(ref name) => {
                if let Some(symbol) = memory.get_symbol(sheet_id, name) {
                    return Ok(Outcome::Text(symbol.display()));
                }
                if let Some(Value::Function(f)) = scopes.lookup(sheet_id, name) {
                    return Ok(Outcome::Text(format!("[Compiled function: {}]", f.name)));
                }
                self.evaluate_expression(&expr, sheet_id)
            }
            other => self.evaluate_expression(&other, sheet_id),
        }
    }

    fn evaluate_expression(&self, expr: &Expr, sheet_id: &str) -> Result<Outcome, MathError> {
        let limits = self.state.eval_limits();
        let value = self
            .state
            .scopes
            .with_scope(sheet_id, |scope| evaluate(expr, scope, &limits))?;
        Ok(Outcome::Text(value.to_string()))
    }

    /// Sample a plot against a sheet's bindings. Functions that fail to parse
    /// or evaluate at a point contribute skipped samples, not errors. All
    /// samples share one time limit; once it is spent the rest are skipped.
    pub fn sample_plot(&self, sheet_id: &str, config: &PlotConfig) -> Result<PlotData, String> {
        let exprs: Vec<Option<Expr>> = config.functions.iter().map(|f| parse(f).ok()).collect();
        let limits = self.state.eval_limits();
        let started = Instant::now();
        self.state.scopes.with_scope(sheet_id, |scope| {
            let mut locals = HashMap::new();
            config.sample(|index, x| {
                let expr = exprs.get(index)?.as_ref()?;
                locals.insert(PLOT_VARIABLE.to_string(), Value::Number(x));
                evaluate_since(expr, scope, &locals, &limits, started)
                    .ok()?
                    .as_number()
            })
        })
    }
}

fn check_assignable(name: &str) -> Result<(), MathError> {
    if is_reserved(name) {
        Err(MathError::ReservedName(name.to_string()))
    } else {
        Ok(())
    }
}
