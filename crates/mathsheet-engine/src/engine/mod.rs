//! Expression engine API.
//!
//! This module provides the parsing and evaluation core:
//!
//! - [`parse`] - Cell text to [`Expr`], classified by [`NodeKind`]
//! - [`Value`], [`Matrix`], [`UserFunction`] - Runtime values
//! - [`Scope`] - Name bindings an expression is evaluated against
//! - [`evaluate`] - Read-only evaluation under [`EvalLimits`]
//! - [`format_number`], [`format_value`] - Display formatting

mod ast;
mod eval;
mod format;
mod parser;
mod scope;
mod value;

pub use ast::{BinaryOp, Expr, NodeKind, UnaryOp};
pub use eval::{EvalLimits, evaluate, evaluate_since, evaluate_with_locals, make_function};
pub use format::{
    format_number, format_number_with_precision, format_value, format_value_with_precision,
};
pub use parser::{MAX_NESTING_DEPTH, parse};
pub use scope::Scope;
pub use value::{Matrix, UserFunction, Value};
