//! Error types for the mathsheet command line

use thiserror::Error;

/// Errors in how the program was invoked
#[derive(Error, Debug, PartialEq)]
pub enum CliError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),
}
