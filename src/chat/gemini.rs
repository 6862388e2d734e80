//! Gemini `generateContent` channel.
//!
//! The API itself is stateless, so the channel keeps the conversation contents and
//! resends them with every message. A turn is only committed to the history once the
//! model has replied.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::chat::backend::{BackendFuture, ChatBackend, ChatChannel};
use crate::chat::error::{BackendError, BackendResult};
use crate::config::ChatConfig;

/// Base URL for the Gemini API.
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    candidate_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

struct Endpoint {
    client: Client,
    url: String,
    api_key: String,
    temperature: f64,
}

/// Gemini backend.
pub struct GeminiBackend {
    client: Client,
    url: String,
    api_key: Option<String>,
    temperature: f64,
}

impl GeminiBackend {
    /// Create a backend from configuration.
    ///
    /// A missing API key is only reported when a channel is opened.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.turn_timeout)
            .build()?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(API_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            client,
            url: format!("{base_url}/models/{}:generateContent", config.model),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            temperature: config.temperature,
        })
    }
}

impl ChatBackend for GeminiBackend {
    fn start_channel(&self) -> BackendResult<Box<dyn ChatChannel>> {
        let api_key = self
            .api_key
            .clone()
            .ok_or(BackendError::MissingApiKey("Gemini"))?;

        Ok(Box::new(GeminiChannel {
            endpoint: Arc::new(Endpoint {
                client: self.client.clone(),
                url: self.url.clone(),
                api_key,
                temperature: self.temperature,
            }),
            history: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// One Gemini conversation.
struct GeminiChannel {
    endpoint: Arc<Endpoint>,
    history: Vec<Content>,
}

impl GeminiChannel {
    async fn exchange(&mut self, message: &str) -> BackendResult<String> {
        let mut contents = self.history.clone();
        contents.push(Content::text("user", message));

        let request = GenerateRequest {
            contents: &contents,
            generation_config: GenerationConfig {
                temperature: self.endpoint.temperature,
                candidate_count: 1,
            },
        };

        debug!("Sending Gemini request with {} contents", contents.len());

        let response = self
            .endpoint
            .client
            .post(&self.endpoint.url)
            .header(API_KEY_HEADER, &self.endpoint.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(status = %status, "Gemini API error");
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        let reply = extract_reply(&parsed)?;

        contents.push(Content::text("model", &reply));
        self.history = contents;
        Ok(reply)
    }
}

impl ChatChannel for GeminiChannel {
    fn send<'a>(&'a mut self, message: &'a str) -> BackendFuture<'a, BackendResult<String>> {
        Box::pin(self.exchange(message))
    }
}

fn extract_reply(response: &GenerateResponse) -> BackendResult<String> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(BackendError::Rejected(format!("prompt blocked: {reason}")));
    }

    let candidate = response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .ok_or(BackendError::EmptyReply)?;

    let text: String = candidate
        .content
        .as_ref()
        .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some(reason) if reason != "STOP" => {
                Err(BackendError::Rejected(format!("finished with {reason}")))
            }
            _ => Err(BackendError::EmptyReply),
        };
    }

    Ok(text)
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}
