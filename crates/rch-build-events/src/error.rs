//! Error types for reading event streams.

use std::io;

use thiserror::Error;

/// Event result type
pub type EventResult<T> = Result<T, EventError>;

/// Errors from reading or decoding build events.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: empty project id")]
    EmptyProject { line: usize },
}

impl EventError {
    /// Line number (1-based) the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Io(_) => None,
            Self::Parse { line, .. } | Self::EmptyProject { line } => Some(*line),
        }
    }
}
