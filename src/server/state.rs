//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::ChatService;

/// Shared application state.
pub struct AppState {
    /// Grounded chat service.
    pub chat: ChatService,
    /// Backend model name, reported by the health check.
    pub model_name: String,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(chat: ChatService, model_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            chat,
            model_name: model_name.into(),
        })
    }
}
