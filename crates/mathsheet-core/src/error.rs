//! Error types for mathsheet core.

use thiserror::Error;

use mathsheet_engine::MathError;
use rhai::EvalAltResult;

/// Errors that can occur while evaluating or storing a notebook
#[derive(Error, Debug)]
pub enum NotebookError {
    #[error(transparent)]
    Math(#[from] MathError),

    /// A command matched but its arguments are unusable. The message already
    /// carries the usage text.
    #[error("{0}")]
    CommandFormat(String),

    /// A symbolic or matrix backend failed inside a command.
    #[error("{0}")]
    External(String),

    #[error("Rhai error: {0}")]
    Rhai(
        #[from]
        #[source]
        Box<EvalAltResult>,
    ),

    #[error("Rhai compile error: {0}")]
    RhaiCompile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Sheet(String),
}

impl NotebookError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        NotebookError::CommandFormat(message.into())
    }

    pub(crate) fn external(message: impl std::fmt::Display) -> Self {
        NotebookError::External(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotebookError>;
