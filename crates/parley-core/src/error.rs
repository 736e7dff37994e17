//! Orchestrator error type.

use parley_session::SessionError;
use parley_types::ApiError;
use thiserror::Error;

/// Failure of a chat, upload or clear operation.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Remote model error: {0}")]
    Remote(#[from] ApiError),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    #[error("Upload storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Message is empty")]
    EmptyMessage,
}

impl ChatError {
    /// True when the caller sent bad input, as opposed to a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChatError::InvalidUpload(_) | ChatError::EmptyMessage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors() {
        assert!(ChatError::EmptyMessage.is_client_error());
        assert!(ChatError::InvalidUpload("no file".into()).is_client_error());
        assert!(!ChatError::Remote(ApiError::Timeout).is_client_error());
    }
}
