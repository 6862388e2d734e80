//! Error taxonomy for the conversation engine.

use std::time::Duration;

use thiserror::Error;

use crate::chat::session::SessionId;
use crate::context::InvalidBudget;
use crate::transcript::{ProviderError, SegmentError};

/// Transport or protocol failure of a generative backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend answered with a non-success status.
    #[error("backend returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the body.
        message: String,
    },
    /// Response body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    RigHttp(#[from] rig::http_client::Error),
    /// Completion error from Rig.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// The backend refused or blocked the request.
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    /// The backend replied without any text.
    #[error("backend returned an empty reply")]
    EmptyReply,
    /// A required credential is missing.
    #[error("missing API key for {0}")]
    MissingApiKey(&'static str),
    /// The caller stopped waiting for the reply.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

/// Convenience result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Every failure the caller-facing API can report.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or empty required field.
    #[error("invalid request: {0}")]
    InputValidation(String),
    /// Captions could not be fetched.
    #[error("transcript unavailable for video {video_id}")]
    TranscriptUnavailable {
        /// Requested video.
        video_id: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
    /// Video metadata could not be fetched.
    #[error("metadata unavailable for video {video_id}")]
    MetadataUnavailable {
        /// Requested video.
        video_id: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
    /// A caption segment cannot be used as grounding.
    #[error(transparent)]
    MalformedTranscriptSegment(#[from] SegmentError),
    /// Context budget is not usable.
    #[error(transparent)]
    InvalidBudget(#[from] InvalidBudget),
    /// The user message is empty.
    #[error("user message must not be empty")]
    EmptyMessage,
    /// The grounding context could not be delivered before a turn.
    #[error("failed to prime the chat session")]
    PrimingFailed(#[source] BackendError),
    /// The backend failed while handling a message.
    #[error("chat backend error")]
    ChatBackend(#[source] BackendError),
    /// No live session has this identifier.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
}

impl ChatError {
    /// Stable error kind reported to callers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InputValidation(_) => "InputValidationError",
            Self::TranscriptUnavailable { .. } => "TranscriptUnavailable",
            Self::MetadataUnavailable { .. } => "MetadataUnavailable",
            Self::MalformedTranscriptSegment(_) => "MalformedTranscriptSegment",
            Self::InvalidBudget(_) => "InvalidBudget",
            Self::EmptyMessage => "EmptyMessage",
            Self::PrimingFailed(_) => "PrimingFailed",
            Self::ChatBackend(_) => "ChatBackendError",
            Self::SessionNotFound(_) => "SessionNotFound",
        }
    }

    /// Message safe to show end users; never includes upstream causes.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InputValidation(_)
            | Self::MalformedTranscriptSegment(_)
            | Self::InvalidBudget(_)
            | Self::EmptyMessage
            | Self::SessionNotFound(_) => self.to_string(),
            Self::TranscriptUnavailable { .. } => "Failed to fetch transcript".to_string(),
            Self::MetadataUnavailable { .. } => "Failed to fetch video info".to_string(),
            Self::PrimingFailed(_) | Self::ChatBackend(_) => {
                "Failed to generate chat response".to_string()
            }
        }
    }

    /// Whether the failure was caused by the request itself.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InputValidation(_)
                | Self::MalformedTranscriptSegment(_)
                | Self::InvalidBudget(_)
                | Self::EmptyMessage
        )
    }

    /// Whether the requested session or video does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::SessionNotFound(_) => true,
            Self::TranscriptUnavailable { source, .. } | Self::MetadataUnavailable { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }

    /// The backend failure behind this error, if any.
    #[must_use]
    pub const fn backend_cause(&self) -> Option<&BackendError> {
        match self {
            Self::PrimingFailed(cause) | Self::ChatBackend(cause) => Some(cause),
            _ => None,
        }
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
