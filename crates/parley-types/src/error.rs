//! Error hierarchy for Parley.

use thiserror::Error;

/// Errors from the remote generative model and its file-hosting API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Model returned no text (reason: {reason})")]
    EmptyResponse { reason: String },

    #[error("Remote processing failed for file {name}")]
    FileProcessingFailed { name: String },

    #[error("File {name} not ready after {attempts} checks")]
    FileNotReady { name: String, attempts: u32 },
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file parse error at {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_not_ready_message_names_the_file() {
        let err = ApiError::FileNotReady {
            name: "files/abc123".into(),
            attempts: 10,
        };
        assert_eq!(err.to_string(), "File files/abc123 not ready after 10 checks");
    }

    #[test]
    fn missing_key_message() {
        let err = ConfigError::MissingKey {
            key: "secret_key".into(),
        };
        assert!(err.to_string().contains("secret_key"));
    }
}
