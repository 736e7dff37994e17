//! Bounded readiness polling for uploaded files.

use std::time::Duration;

use parley_types::{ApiError, FileState, GenerativeModel, RemoteFile};
use rand::Rng;

/// How long, and how often, to wait for an uploaded file to become usable.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Maximum number of status lookups before giving up.
    pub max_attempts: u32,
    /// Delay in milliseconds before the first lookup.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between lookups.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each lookup.
    pub backoff_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_factor: 1.5,
        }
    }
}

impl PollConfig {
    /// Upper bound on the total time spent sleeping, ignoring jitter.
    pub fn max_wait_ms(&self) -> u64 {
        (0..self.max_attempts)
            .map(|attempt| base_delay(self, attempt) as u64)
            .sum()
    }
}

fn base_delay(config: &PollConfig, attempt: u32) -> f64 {
    let base = config.initial_delay_ms as f64 * config.backoff_factor.powi(attempt as i32);
    base.min(config.max_delay_ms as f64)
}

/// Calculate the delay in milliseconds before lookup number `attempt`.
///
/// Exponential backoff `initial_delay_ms * backoff_factor^attempt` with ±25%
/// jitter, clamped to `max_delay_ms`.
pub fn calculate_delay(config: &PollConfig, attempt: u32) -> u64 {
    let clamped = base_delay(config, attempt);
    let jitter_factor = rand::rng().random_range(0.75..=1.25);
    ((clamped * jitter_factor) as u64).min(config.max_delay_ms)
}

/// Wait until `file` reports `ACTIVE`, re-fetching it with backoff.
///
/// Fails with `FileProcessingFailed` as soon as the remote reports `FAILED`,
/// and with `FileNotReady` once `max_attempts` lookups are used up.
pub async fn wait_until_active(
    model: &dyn GenerativeModel,
    file: RemoteFile,
    config: &PollConfig,
) -> Result<RemoteFile, ApiError> {
    let mut file = file;

    for attempt in 0..config.max_attempts {
        match file.state {
            FileState::Active => return Ok(file),
            FileState::Failed => return Err(ApiError::FileProcessingFailed { name: file.name }),
            FileState::Processing | FileState::StateUnspecified => {}
        }

        let delay = calculate_delay(config, attempt);
        tracing::debug!(
            "File {} not ready (check {}/{}), waiting {delay}ms",
            file.name,
            attempt + 1,
            config.max_attempts
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
        file = model.get_file(&file.name).await?;
    }

    match file.state {
        FileState::Active => Ok(file),
        FileState::Failed => Err(ApiError::FileProcessingFailed { name: file.name }),
        FileState::Processing | FileState::StateUnspecified => Err(ApiError::FileNotReady {
            name: file.name,
            attempts: config.max_attempts,
        }),
    }
}
