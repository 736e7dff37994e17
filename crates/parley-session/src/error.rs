//! Session-specific error types.

use thiserror::Error;

/// Errors that can occur while reading or writing session state.
///
/// A missing session is not an error: stores return an empty session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
