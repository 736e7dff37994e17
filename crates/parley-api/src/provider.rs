//! Gemini implementation of the `GenerativeModel` trait.

use crate::client::ApiClient;
use bytes::Bytes;
use parley_types::provider::ModelFuture;
use parley_types::{ApiError, Content, GenerationConfig, GenerativeModel, RemoteFile};
use std::time::Duration;

/// Gemini-backed generative model.
///
/// Wraps `ApiClient` with a fixed model name and delegates every call.
#[derive(Clone)]
pub struct GeminiProvider {
    client: ApiClient,
    model: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(api_key, base_url, connect_timeout, request_timeout)?,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl GenerativeModel for GeminiProvider {
    fn generate<'a>(
        &'a self,
        contents: &'a [Content],
        config: &'a GenerationConfig,
    ) -> ModelFuture<'a, String> {
        Box::pin(self.client.generate_content(&self.model, contents, config))
    }

    fn upload_file<'a>(
        &'a self,
        data: Bytes,
        display_name: &'a str,
        mime_type: &'a str,
    ) -> ModelFuture<'a, RemoteFile> {
        Box::pin(self.client.upload_file(data, display_name, mime_type))
    }

    fn get_file<'a>(&'a self, name: &'a str) -> ModelFuture<'a, RemoteFile> {
        Box::pin(self.client.get_file(name))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
