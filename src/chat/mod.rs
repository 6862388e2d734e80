//! Grounded conversation engine.
//!
//! - `backend`: chat backend and channel capabilities
//! - `gemini`, `ollama`: backend implementations
//! - `session`: per-conversation state and priming state machine
//! - `coordinator`: priming once, then relaying turns in order
//! - `registry`: bounded map of live sessions
//! - `service`: caller-facing turn API
//! - `error`: error taxonomy

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod gemini;
pub mod message;
pub mod ollama;
pub mod registry;
pub mod service;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendFuture, ChatBackend, ChatChannel, build_backend};
pub use coordinator::SessionCoordinator;
pub use error::{BackendError, BackendResult, ChatError, ChatResult};
pub use gemini::GeminiBackend;
pub use message::{ConversationMessage, Role};
pub use ollama::OllamaBackend;
pub use registry::SessionRegistry;
pub use service::{
    ChatService, ServiceBackends, TranscriptInput, TranscriptView, TurnReply, TurnRequest,
};
pub use session::{PrimingState, Session, SessionId, SessionSnapshot};
