//! Generative backend capability.
//!
//! A backend only has to open stateful channels; a channel only has to answer one
//! message at a time while remembering what it was sent before.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::chat::error::BackendResult;
use crate::chat::gemini::GeminiBackend;
use crate::chat::ollama::OllamaBackend;
use crate::config::{BackendKind, ChatConfig};

/// Boxed future type for backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A stateful conversation with a generative model.
pub trait ChatChannel: Send {
    /// Send one message and wait for the full, non-streamed reply.
    ///
    /// # Errors
    /// Returns an error if the transport or the backend fails.
    fn send<'a>(&'a mut self, message: &'a str) -> BackendFuture<'a, BackendResult<String>>;
}

/// Factory of chat channels.
pub trait ChatBackend: Send + Sync {
    /// Open a new channel without sending anything.
    ///
    /// # Errors
    /// Returns an error if the channel cannot be set up.
    fn start_channel(&self) -> BackendResult<Box<dyn ChatChannel>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Build the configured backend.
///
/// # Errors
/// Returns an error if the backend client cannot be built.
pub fn build_backend(config: &ChatConfig) -> BackendResult<Arc<dyn ChatBackend>> {
    let backend: Arc<dyn ChatBackend> = match config.backend {
        BackendKind::Gemini => Arc::new(GeminiBackend::new(config)?),
        BackendKind::Ollama => Arc::new(OllamaBackend::new(config)?),
    };
    tracing::info!("Chat backend: {} ({})", backend.name(), config.model);
    Ok(backend)
}
