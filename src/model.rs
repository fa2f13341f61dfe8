//! Generative model boundary.
//!
//! `TextModel` is the seam the generation driver talks to; `GeminiModel` is the
//! production implementation against the Gemini `generateContent` REST endpoint.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GeminiConfig;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no API key: set {env_var} or add it to {env_file}")]
    MissingApiKey { env_var: String, env_file: String },

    #[error("failed to read env file {path}: {message}")]
    EnvFile { path: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode model response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("prompt was blocked by the model: {reason}")]
    Blocked { reason: String },

    #[error("model returned no text")]
    EmptyResponse,
}

/// Anything that turns a prompt into text.
pub trait TextModel {
    fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    message: String,
}

fn build_request<'a>(prompt: &'a str, temperature: Option<f32>) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: temperature.map(|temperature| GenerationConfig { temperature }),
    }
}

/// Extract the text of the first candidate from a `generateContent` response body.
fn extract_text(body: &str) -> Result<String, ModelError> {
    let response: GenerateContentResponse = serde_json::from_str(body)?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(ModelError::Blocked { reason });
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        if let Some(reason) = candidate.finish_reason {
            debug!(finish_reason = %reason, "empty_candidate");
        }
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

/// Pull a readable message out of an error response, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Gemini client over a blocking HTTP connection.
pub struct GeminiModel {
    client: Client,
    url: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl GeminiModel {
    pub fn new(config: &GeminiConfig, api_key: String) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()?;
        Ok(Self {
            client,
            url: endpoint_url(&config.endpoint, &config.model),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }
}

fn endpoint_url(endpoint: &str, model: &str) -> String {
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!(
        "{}/models/{}:generateContent",
        endpoint.trim_end_matches('/'),
        model
    )
}

impl TextModel for GeminiModel {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let request = build_request(prompt, self.temperature);
        debug!(url = %self.url, prompt_bytes = prompt.len(), "model_request");

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        debug!(status = status.as_u16(), body_bytes = body.len(), "model_response");

        if !status.is_success() {
            let message = error_message(&body);
            warn!(status = status.as_u16(), error = %message, "model_request_failed");
            return Err(ModelError::Status {
                status: status.as_u16(),
                message,
            });
        }

        extract_text(&body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
