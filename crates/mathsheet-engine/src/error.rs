//! Error types for the expression engine.

use thiserror::Error;

/// Errors raised while parsing or evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("{message} (char {position})")]
    Parse { position: usize, message: String },

    #[error("Undefined symbol {0}")]
    UndefinedSymbol(String),

    #[error("Undefined function {0}")]
    UndefinedFunction(String),

    #[error("Wrong number of arguments in function {name} (expected: {expected}, actual: {actual})")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unexpected type of argument in {context} (expected: {expected}, actual: {actual})")]
    Type {
        context: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Dimension mismatch: {0}")]
    Dimension(String),

    #[error("Cannot calculate inverse, determinant is zero")]
    SingularMatrix,

    #[error("{0}")]
    Domain(String),

    #[error("Cannot assign to reserved name {0}")]
    ReservedName(String),

    #[error("Evaluation exceeded the {0} ms time limit")]
    Timeout(u64),

    #[error("Maximum call depth of {0} exceeded")]
    CallDepth(usize),
}

impl MathError {
    pub(crate) fn parse(position: usize, message: impl Into<String>) -> Self {
        MathError::Parse {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn domain(message: impl Into<String>) -> Self {
        MathError::Domain(message.into())
    }
}

pub type Result<T> = std::result::Result<T, MathError>;
