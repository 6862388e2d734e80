//! Ollama channel through Rig.

use std::sync::Arc;

use reqwest::Client as ReqwestClient;
use rig::client::{CompletionClient, Nothing};
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message};
use rig::providers::ollama;
use tracing::debug;

use crate::chat::backend::{BackendFuture, ChatBackend, ChatChannel};
use crate::chat::error::{BackendError, BackendResult};
use crate::config::ChatConfig;

/// Ollama backend using the Rig provider.
pub struct OllamaBackend {
    model: Arc<ollama::CompletionModel>,
    temperature: f64,
}

impl OllamaBackend {
    /// Create a backend from configuration.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(config: &ChatConfig) -> BackendResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(BackendError::from)?;
        let model = client.completion_model(config.model.clone());

        Ok(Self {
            model: Arc::new(model),
            temperature: config.temperature,
        })
    }
}

impl ChatBackend for OllamaBackend {
    fn start_channel(&self) -> BackendResult<Box<dyn ChatChannel>> {
        Ok(Box::new(OllamaChannel {
            model: Arc::clone(&self.model),
            temperature: self.temperature,
            history: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

/// One Ollama conversation; history is replayed with each request.
struct OllamaChannel {
    model: Arc<ollama::CompletionModel>,
    temperature: f64,
    history: Vec<Message>,
}

impl OllamaChannel {
    async fn exchange(&mut self, message: &str) -> BackendResult<String> {
        debug!("Sending Ollama request with {} prior messages", self.history.len());

        let request = self
            .model
            .completion_request(message.to_string())
            .messages(self.history.clone())
            .temperature(self.temperature)
            .build();

        let response = self.model.completion(request).await?;
        let reply = extract_text(&response.choice);
        if reply.is_empty() {
            return Err(BackendError::EmptyReply);
        }

        self.history.push(Message::user(message));
        self.history.push(Message::assistant(reply.clone()));
        Ok(reply)
    }
}

impl ChatChannel for OllamaChannel {
    fn send<'a>(&'a mut self, message: &'a str) -> BackendFuture<'a, BackendResult<String>> {
        Box::pin(self.exchange(message))
    }
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
