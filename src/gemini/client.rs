//! HTTP client for the Gemini `generateContent` endpoint

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::GenerativeModel;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Inference errors
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Response does not match the expected schema: {0}")]
    MalformedResponse(String),
}

/// Gemini client configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per call (1 = no retry)
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            max_retries: 1,
            retry_delay_ms: 1000,
        }
    }
}

/// `generateContent` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Single-turn request constrained to JSON matching `schema`
    pub fn json(parts: Vec<Part>, schema: serde_json::Value) -> Self {
        Self {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: schema,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline(mime_type: &str, base64: &str) -> Self {
        Part::InlineData {
            inline_data: Blob {
                mime_type: mime_type.to_string(),
                data: base64.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
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
}

/// Concatenate the text parts of the first candidate
fn extract_text(body: &str) -> Result<String, InferenceError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(InferenceError::EmptyResponse)?;

    if let Some(reason) = &candidate.finish_reason {
        if reason != "STOP" {
            tracing::warn!("Generation finished with reason {}", reason);
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(InferenceError::EmptyResponse);
    }
    Ok(text)
}

/// Gemini REST client
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn send_once(&self, request: &GenerateContentRequest) -> Result<String, InferenceError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        extract_text(&body)
    }
}

/// Worth another attempt: transport failures, rate limiting and server errors
fn is_retryable(err: &InferenceError) -> bool {
    match err {
        InferenceError::RequestFailed(_) => true,
        InferenceError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: &GenerateContentRequest) -> Result<String, InferenceError> {
        let attempts = self.config.max_retries.max(1);
        let parts: usize = request.contents.iter().map(|c| c.parts.len()).sum();
        tracing::info!("Calling {} ({} parts)", self.config.model, parts);

        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(e) if is_retryable(&e) && attempt + 1 < attempts => {
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    let backoff =
                        Duration::from_millis(self.config.retry_delay_ms * (attempt as u64 + 1));
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
