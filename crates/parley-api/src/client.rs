//! Gemini REST client: generateContent plus the Files API.

use std::time::Duration;

use bytes::Bytes;
use parley_types::{ApiError, Content, GenerationConfig, RemoteFile};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Upload session URL returned by the resumable upload `start` command.
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Client for the Gemini REST API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client with the given connect and whole-request timeouts.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Send one generateContent request and return the reply text.
    ///
    /// Single attempt: failures are returned to the caller unretried.
    pub async fn generate_content(
        &self,
        model: &str,
        contents: &[Content],
        config: &GenerationConfig,
    ) -> Result<String, ApiError> {
        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url);
        let body = GenerateRequest {
            contents,
            generation_config: config,
        };

        tracing::debug!("POST {url} ({} contents)", contents.len());

        let request = self
            .http
            .post(&url)
            .headers(self.auth_headers()?)
            .json(&body);
        let response = self.send(request).await?;
        let text = read_body(response).await?;

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::MalformedResponse(format!("generateContent: {e}")))?;
        extract_text(parsed)
    }

    /// Upload a file with the resumable protocol (start, then upload+finalize).
    pub async fn upload_file(
        &self,
        data: Bytes,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, ApiError> {
        let url = format!("{}/upload/v1beta/files", self.base_url);

        let mut headers = self.auth_headers()?;
        headers.insert("x-goog-upload-protocol", HeaderValue::from_static("resumable"));
        headers.insert("x-goog-upload-command", HeaderValue::from_static("start"));
        headers.insert(
            "x-goog-upload-header-content-length",
            HeaderValue::from(data.len() as u64),
        );
        headers.insert(
            "x-goog-upload-header-content-type",
            HeaderValue::from_str(mime_type).map_err(|_| ApiError::BadRequest {
                message: format!("Invalid MIME type: {mime_type}"),
            })?,
        );

        tracing::debug!("POST {url} (start upload of {} bytes)", data.len());

        let start = self
            .http
            .post(&url)
            .headers(headers)
            .json(&StartUpload {
                file: StartUploadFile { display_name },
            });
        let response = self.send(start).await?;
        let upload_url = response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::MalformedResponse("upload start response has no upload URL".into())
            })?;

        let mut headers = self.auth_headers()?;
        headers.insert("x-goog-upload-offset", HeaderValue::from_static("0"));
        headers.insert(
            "x-goog-upload-command",
            HeaderValue::from_static("upload, finalize"),
        );

        tracing::debug!("POST {upload_url} (upload, finalize)");

        let finalize = self.http.post(&upload_url).headers(headers).body(data);
        let response = self.send(finalize).await?;
        let text = read_body(response).await?;

        let parsed: UploadResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::MalformedResponse(format!("file upload: {e}")))?;
        Ok(parsed.file)
    }

    /// Fetch file metadata by resource name, e.g. `files/abc123`.
    pub async fn get_file(&self, name: &str) -> Result<RemoteFile, ApiError> {
        let url = format!("{}/v1beta/{name}", self.base_url);
        tracing::debug!("GET {url}");

        let request = self.http.get(&url).headers(self.auth_headers()?);
        let response = self.send(request).await?;
        let text = read_body(response).await?;

        serde_json::from_str(&text)
            .map_err(|e| ApiError::MalformedResponse(format!("file lookup: {e}")))
    }

    fn auth_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| ApiError::Auth {
                message: "Invalid API key format".into(),
            })?,
        );
        Ok(headers)
    }

    /// Send a request, mapping transport failures and non-2xx statuses.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let body_text = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), &body_text, retry_after))
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
    response.text().await.map_err(|e| {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(e.to_string())
        }
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct StartUpload<'a> {
    file: StartUploadFile<'a>,
}

#[derive(Serialize)]
struct StartUploadFile<'a> {
    display_name: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Concatenate the non-thought text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> Result<String, ApiError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ApiError::EmptyResponse { reason });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    if text.is_empty() {
        return Err(ApiError::EmptyResponse {
            reason: candidate
                .finish_reason
                .unwrap_or_else(|| "no text".to_string()),
        });
    }
    Ok(text)
}

/// Parse the `retry-after` header value as seconds and convert to milliseconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64)
}

/// Classify an HTTP error response into a typed ApiError.
fn classify_error(status: u16, body: &str, retry_after: Option<u64>) -> ApiError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        400 => ApiError::BadRequest { message },
        401 | 403 => ApiError::Auth { message },
        404 => ApiError::NotFound { message },
        429 => ApiError::RateLimited {
            retry_after_ms: retry_after,
        },
        _ => ApiError::Server { status, message },
    }
}
