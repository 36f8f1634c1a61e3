//! Expression engine for mathsheet notebooks: parser, evaluator, symbolic
//! derivative, root finding, matrix algebra and plot sampling.

pub mod builtins;
pub mod calculus;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod plot;
pub mod solve;

pub use engine::{EvalLimits, Expr, NodeKind, Scope, Value, evaluate, parse};
pub use error::{MathError, Result};
