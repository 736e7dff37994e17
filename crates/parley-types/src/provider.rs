//! Trait for remote generative model backends.

use crate::{ApiError, Content, GenerationConfig, RemoteFile};
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`GenerativeModel`] methods.
pub type ModelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// A stateless remote model plus its file-hosting facility.
///
/// The model keeps no conversation memory: every `generate` call carries the
/// whole transcript. Dyn-compatible so the orchestrator can hold an
/// `Arc<dyn GenerativeModel>`.
pub trait GenerativeModel: Send + Sync {
    /// Generate a text reply for the full transcript `contents`.
    fn generate<'a>(
        &'a self,
        contents: &'a [Content],
        config: &'a GenerationConfig,
    ) -> ModelFuture<'a, String>;

    /// Submit a file to the remote file-hosting facility.
    fn upload_file<'a>(
        &'a self,
        data: Bytes,
        display_name: &'a str,
        mime_type: &'a str,
    ) -> ModelFuture<'a, RemoteFile>;

    /// Look up a hosted file by resource name (e.g. `files/abc123`).
    fn get_file<'a>(&'a self, name: &'a str) -> ModelFuture<'a, RemoteFile>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
