//! Live conversation state.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::chat::backend::ChatChannel;
use crate::chat::message::ConversationMessage;
use crate::context::VideoIdentity;

/// Generate an ID intended to have good insert locality.
///
/// With feature `uuid_v7` enabled, this uses `Uuid::now_v7()`.
/// Otherwise it falls back to `Uuid::new_v4()`.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Identifier of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(uuid_time_ordered())
    }
}

impl Default for SessionId {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// Whether the grounding context has reached the backend.
///
/// `Priming` is only held while a priming exchange is in flight; a failed or
/// abandoned exchange counts as unprimed and is retried on the next turn.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimingState {
    /// Nothing sent yet, or the last priming attempt failed.
    #[default]
    Unprimed,
    /// The priming message is in flight.
    Priming,
    /// The backend holds the grounding context.
    Primed,
}

/// One grounded conversation.
///
/// All backend traffic for a session goes through its internal lock, so at most one
/// priming or turn exchange is in flight at a time.
pub struct Session {
    id: SessionId,
    video: VideoIdentity,
    grounding: String,
    created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) channel: Box<dyn ChatChannel>,
    pub(crate) state: PrimingState,
    pub(crate) priming_attempts: u32,
    pub(crate) history: Vec<ConversationMessage>,
    pub(crate) last_turn_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a session for callers.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: SessionId,
    /// Video title.
    pub video_title: String,
    /// Publishing channel, when known.
    pub video_channel: Option<String>,
    /// Priming state.
    pub state: PrimingState,
    /// Conversation so far, in order.
    pub history: Vec<ConversationMessage>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last successful turn.
    pub last_turn_at: Option<DateTime<Utc>>,
}

impl Session {
    pub(crate) fn new(
        video: VideoIdentity,
        grounding: String,
        channel: Box<dyn ChatChannel>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            video,
            grounding,
            created_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                channel,
                state: PrimingState::Unprimed,
                priming_attempts: 0,
                history: Vec::new(),
                last_turn_at: None,
            }),
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Video this session is about.
    #[must_use]
    pub const fn video(&self) -> &VideoIdentity {
        &self.video
    }

    /// Normalized transcript used as grounding, before bounding.
    #[must_use]
    pub fn grounding(&self) -> &str {
        &self.grounding
    }

    /// Current priming state; waits for any in-flight exchange.
    pub async fn state(&self) -> PrimingState {
        self.inner.lock().await.state
    }

    /// Number of priming exchanges attempted so far.
    pub async fn priming_attempts(&self) -> u32 {
        self.inner.lock().await.priming_attempts
    }

    /// Conversation history; waits for any in-flight exchange.
    pub async fn history(&self) -> Vec<ConversationMessage> {
        self.inner.lock().await.history.clone()
    }

    /// Snapshot of the session for callers.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            session_id: self.id,
            video_title: self.video.title.clone(),
            video_channel: self.video.channel.clone(),
            state: inner.state,
            history: inner.history.clone(),
            created_at: self.created_at,
            last_turn_at: inner.last_turn_at,
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("video", &self.video)
            .field("grounding_chars", &self.grounding.chars().count())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    pub(crate) fn begin_priming(&mut self) {
        self.state = PrimingState::Priming;
        self.priming_attempts += 1;
    }

    pub(crate) fn finish_priming(&mut self, succeeded: bool) {
        self.state = if succeeded {
            PrimingState::Primed
        } else {
            PrimingState::Unprimed
        };
    }

    pub(crate) fn record_turn(&mut self, user_message: &str, reply: &str) {
        self.history.push(ConversationMessage::user(user_message));
        self.history.push(ConversationMessage::assistant(reply));
        self.last_turn_at = Some(Utc::now());
    }
}
