//! Priming message construction.

use serde::{Deserialize, Serialize};

/// Text used in place of the transcript when no captions are available.
pub const NO_TRANSCRIPT: &str = "No transcript available";

/// Opening words of every priming message.
pub const PRIMING_PREFIX: &str = "I will act as an AI assistant discussing the YouTube video";

/// Identity of the video a session is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoIdentity {
    /// Video title.
    pub title: String,
    /// Publishing channel, when known.
    pub channel: Option<String>,
}

impl VideoIdentity {
    /// Identity with a title only.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            channel: None,
        }
    }

    /// Attach the channel name.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        self.channel = (!channel.trim().is_empty()).then_some(channel);
        self
    }
}

/// Build the single message that grounds a fresh backend channel.
///
/// `bounded_context` must already fit the budget; an empty one means no grounding.
#[must_use]
pub fn build_priming_message(video: &VideoIdentity, bounded_context: &str) -> String {
    let summary = if bounded_context.is_empty() {
        NO_TRANSCRIPT
    } else {
        bounded_context
    };

    match &video.channel {
        Some(channel) => format!(
            "{PRIMING_PREFIX} \"{}\" from the channel \"{channel}\". Here's a summary of the video transcript: {summary}",
            video.title
        ),
        None => format!(
            "{PRIMING_PREFIX} \"{}\". Here's a summary of the video transcript: {summary}",
            video.title
        ),
    }
}
