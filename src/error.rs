//! Crate-level error type
//!
//! Each module keeps its own error enum; `Error` folds them together for
//! callers that drive a whole refresh or command.

use thiserror::Error;

use crate::ini::IniError;
use crate::resolve::CyclicHistoryError;
use crate::runner::RunnerError;

/// Output from the migration tool (or the model inspector) had a shape we
/// could not make sense of.
#[derive(Debug, Error)]
#[error("unexpected {what} output: {message}")]
pub struct ParseError {
    pub what: &'static str,
    pub message: String,
}

impl ParseError {
    pub fn new(what: &'static str, message: impl Into<String>) -> Self {
        Self {
            what,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Ini(#[from] IniError),

    #[error(transparent)]
    CyclicHistory(#[from] CyclicHistoryError),

    #[error("revision '{0}' not found")]
    UnknownRevision(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
