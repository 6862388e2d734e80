//! Error types for the transcript and metadata providers.

use thiserror::Error;

/// Errors raised while fetching captions or video metadata.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(reqwest::Error),

    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The video does not exist or is private.
    #[error("video not found: {0}")]
    VideoNotFound(String),

    /// Captions are disabled or no track exists for the video.
    #[error("captions unavailable for video {0}")]
    CaptionsUnavailable(String),

    /// The watch page did not have the expected shape.
    #[error("unexpected page layout: {0}")]
    UnexpectedLayout(String),

    /// API key required but not configured.
    #[error("API key required for {0}")]
    ApiKeyRequired(String),

    /// Access denied or quota exceeded.
    #[error("Access denied: {0}")]
    AccessDenied(String),
}

impl ProviderError {
    /// Whether the error means the video itself is unknown.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::VideoNotFound(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    /// Drops the request URL, which may carry credentials or signed parameters.
    fn from(err: reqwest::Error) -> Self {
        Self::HttpRequest(err.without_url())
    }
}

/// Convenience result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
