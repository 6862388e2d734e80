//! Caller-facing turn API.
//!
//! Validates a request before any external call, resolves the grounding transcript,
//! then hands the newest user message to the coordinator. Caller-supplied history is
//! accepted but never replayed: the backend channel's own memory is authoritative.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::chat::backend::ChatBackend;
use crate::chat::coordinator::SessionCoordinator;
use crate::chat::error::{BackendError, ChatError, ChatResult};
use crate::chat::message::{ConversationMessage, Role};
use crate::chat::registry::SessionRegistry;
use crate::chat::session::{Session, SessionId, SessionSnapshot};
use crate::config::{ChatConfig, ConfigError};
use crate::context::{ContextBounder, VideoIdentity};
use crate::transcript::{
    MetadataProvider, TranscriptNormalizer, TranscriptProvider, TranscriptSegment, VideoMetadata,
    parse_segments,
};

/// External collaborators of the service.
pub struct ServiceBackends {
    /// Generative chat backend.
    pub chat: Arc<dyn ChatBackend>,
    /// Caption source.
    pub transcripts: Arc<dyn TranscriptProvider>,
    /// Video metadata source.
    pub metadata: Arc<dyn MetadataProvider>,
}

/// Transcript supplied by the caller, either already joined or as raw segments.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum TranscriptInput {
    /// Plain transcript text.
    Text(String),
    /// Raw `{ text, offset?, duration? }` segments.
    Segments(Vec<Value>),
}

/// One turn as submitted by the caller.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Continue this session instead of starting a new one.
    pub session_id: Option<SessionId>,
    /// Video to fetch captions for when no transcript is supplied.
    pub video_id: Option<String>,
    /// Video title; required for a new session.
    pub video_title: Option<String>,
    /// Publishing channel.
    pub video_channel: Option<String>,
    /// Caller-supplied transcript.
    pub video_transcript: Option<TranscriptInput>,
    /// Prior conversation, accepted but not re-sent.
    #[serde(default, alias = "priorMessages")]
    pub messages: Vec<ConversationMessage>,
    /// New user message; defaults to the last user entry of `messages`.
    pub message: Option<String>,
}

impl TurnRequest {
    fn new_message(&self) -> ChatResult<&str> {
        let message = match &self.message {
            Some(message) => message.as_str(),
            None => self
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .ok_or_else(|| ChatError::InputValidation("A user message is required".to_string()))?,
        };

        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(message)
    }

    fn video(&self) -> ChatResult<VideoIdentity> {
        let title = self
            .video_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ChatError::InputValidation("Video title is required".to_string()))?;

        let video = VideoIdentity::titled(title);
        Ok(match &self.video_channel {
            Some(channel) => video.with_channel(channel.trim()),
            None => video,
        })
    }
}

/// Successful turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    /// Session that handled the turn.
    pub session_id: SessionId,
    /// Assistant reply, unmodified.
    pub reply: String,
}

/// Normalized transcript of a video.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptView {
    /// Normalized transcript text.
    pub full_text: String,
    /// Number of caption segments it was built from.
    pub segments: usize,
}

/// Grounded chat over video transcripts.
pub struct ChatService {
    coordinator: SessionCoordinator,
    registry: SessionRegistry,
    normalizer: TranscriptNormalizer,
    transcripts: Arc<dyn TranscriptProvider>,
    metadata: Arc<dyn MetadataProvider>,
    turn_timeout: Duration,
}

impl ChatService {
    /// Create the service.
    ///
    /// # Errors
    /// Returns an error if the budget or the session capacity is zero.
    pub fn new(config: &ChatConfig, backends: ServiceBackends) -> Result<Self, ConfigError> {
        let bounder = ContextBounder::new(config.max_context_chars)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let capacity = NonZeroUsize::new(config.max_sessions)
            .ok_or_else(|| ConfigError::Invalid("chat.max_sessions must be > 0".to_string()))?;

        Ok(Self {
            coordinator: SessionCoordinator::new(backends.chat, bounder),
            registry: SessionRegistry::new(capacity),
            normalizer: TranscriptNormalizer::new()?,
            transcripts: backends.transcripts,
            metadata: backends.metadata,
            turn_timeout: config.turn_timeout,
        })
    }

    /// Handle one user turn, starting a session when none is given.
    ///
    /// A new session is only registered once its first turn succeeded.
    pub async fn turn(&self, request: TurnRequest) -> ChatResult<TurnReply> {
        let message = request.new_message()?;

        if let Some(id) = request.session_id {
            let session = self
                .registry
                .get(id)
                .await
                .ok_or(ChatError::SessionNotFound(id))?;
            let reply = self.relay(&session, message).await?;
            return Ok(TurnReply {
                session_id: id,
                reply,
            });
        }

        let video = request.video()?;
        if !request.messages.is_empty() {
            info!(
                "Ignoring {} prior messages for new session on \"{}\"",
                request.messages.len(),
                video.title
            );
        }

        let grounding = self.grounding(&request).await?;
        let session = self.coordinator.start(video, grounding)?;
        let reply = self.relay(&session, message).await?;
        let session = self.registry.insert(session).await;

        Ok(TurnReply {
            session_id: session.id(),
            reply,
        })
    }

    /// Fetch and normalize the transcript of a video.
    pub async fn transcript(&self, video_id: &str) -> ChatResult<TranscriptView> {
        let segments = self.fetch_segments(video_id).await?;
        Ok(TranscriptView {
            full_text: self.normalizer.normalize(&segments)?,
            segments: segments.len(),
        })
    }

    /// Fetch the public metadata of a video.
    pub async fn video_info(&self, video_id: &str) -> ChatResult<VideoMetadata> {
        let video_id = require_video_id(video_id)?;
        self.metadata
            .fetch_metadata(video_id)
            .await
            .map_err(|source| {
                warn!("Metadata fetch failed for {video_id}: {source}");
                ChatError::MetadataUnavailable {
                    video_id: video_id.to_string(),
                    source,
                }
            })
    }

    /// Snapshot of a live session.
    pub async fn history(&self, id: SessionId) -> ChatResult<SessionSnapshot> {
        let session = self
            .registry
            .get(id)
            .await
            .ok_or(ChatError::SessionNotFound(id))?;
        Ok(session.snapshot().await)
    }

    /// End a conversation and forget its session.
    pub async fn end_session(&self, id: SessionId) -> ChatResult<()> {
        if self.registry.remove(id).await {
            info!("Ended session {id}");
            Ok(())
        } else {
            Err(ChatError::SessionNotFound(id))
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    async fn relay(&self, session: &Session, message: &str) -> ChatResult<String> {
        // Dropping the turn future releases the session lock; the backend request
        // itself may still complete upstream.
        tokio::time::timeout(self.turn_timeout, self.coordinator.turn(session, message))
            .await
            .unwrap_or_else(|_| {
                warn!(
                    "Session {} turn abandoned after {:?}",
                    session.id(),
                    self.turn_timeout
                );
                Err(ChatError::ChatBackend(BackendError::Timeout(self.turn_timeout)))
            })
    }

    async fn grounding(&self, request: &TurnRequest) -> ChatResult<String> {
        match (&request.video_transcript, &request.video_id) {
            (Some(TranscriptInput::Text(text)), _) => Ok(self
                .normalizer
                .normalize(&[TranscriptSegment::untimed(text.as_str())])?),
            (Some(TranscriptInput::Segments(values)), _) => {
                let segments = parse_segments(values)?;
                Ok(self.normalizer.normalize(&segments)?)
            }
            (None, Some(video_id)) if !video_id.trim().is_empty() => {
                let segments = self.fetch_segments(video_id).await?;
                Ok(self.normalizer.normalize(&segments)?)
            }
            (None, _) => Ok(String::new()),
        }
    }

    async fn fetch_segments(&self, video_id: &str) -> ChatResult<Vec<TranscriptSegment>> {
        let video_id = require_video_id(video_id)?;
        let segments = self
            .transcripts
            .fetch_transcript(video_id)
            .await
            .map_err(|source| {
                warn!("Transcript fetch failed for {video_id}: {source}");
                ChatError::TranscriptUnavailable {
                    video_id: video_id.to_string(),
                    source,
                }
            })?;
        info!("Fetched {} transcript segments for {video_id}", segments.len());
        Ok(segments)
    }
}

fn require_video_id(video_id: &str) -> ChatResult<&str> {
    let video_id = video_id.trim();
    if video_id.is_empty() {
        return Err(ChatError::InputValidation("Video ID is required".to_string()));
    }
    Ok(video_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::session::PrimingState;
    use crate::chat::testing::{ScriptedBackend, StubMetadata, StubTranscripts};
    use crate::context::{NO_TRANSCRIPT, PRIMING_PREFIX};
    use serde_json::json;

    fn service_with(
        config: &ChatConfig,
        backend: &ScriptedBackend,
        transcripts: &StubTranscripts,
        metadata: StubMetadata,
    ) -> ChatService {
        ChatService::new(
            config,
            ServiceBackends {
                chat: Arc::new(backend.clone()),
                transcripts: Arc::new(transcripts.clone()),
                metadata: Arc::new(metadata),
            },
        )
        .unwrap()
    }

    fn service(backend: &ScriptedBackend, transcripts: &StubTranscripts) -> ChatService {
        service_with(
            &ChatConfig::default(),
            backend,
            transcripts,
            StubMetadata::missing(),
        )
    }

    fn request(value: Value) -> TurnRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_grounded_turn() {
        let backend = ScriptedBackend::replying("It is about testing.");
        let service = service(&backend, &StubTranscripts::failing());

        let reply = service
            .turn(request(json!({
                "videoTitle": "Intro to Testing",
                "videoTranscript": [{"text": "Hello  world"}, {"text": "this is a test"}],
                "message": "What is this video about?"
            })))
            .await
            .unwrap();
        assert_eq!(reply.reply, "It is about testing.");

        let sent = backend.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("Intro to Testing"));
        assert!(sent[0].contains("Hello world this is a test"));
        assert_eq!(sent[1], "What is this video about?");
        assert_eq!(service.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_transcript_failure_never_reaches_backend() {
        let backend = ScriptedBackend::replying("ok");
        let transcripts = StubTranscripts::failing();
        let service = service(&backend, &transcripts);

        let err = service
            .turn(request(json!({
                "videoId": "abc123",
                "videoTitle": "Video",
                "message": "hi"
            })))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "TranscriptUnavailable");
        assert_eq!(transcripts.calls(), 1);
        assert_eq!(backend.channels_started(), 0);
        assert!(backend.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_rejected_before_any_call() {
        let backend = ScriptedBackend::replying("ok");
        let transcripts = StubTranscripts::with_texts(&["hello"]);
        let service = service(&backend, &transcripts);

        let err = service
            .turn(request(json!({
                "videoId": "abc123",
                "videoTitle": "Video",
                "message": ""
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::EmptyMessage));
        assert_eq!(transcripts.calls(), 0);
        assert!(backend.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_title_is_validation_error() {
        let backend = ScriptedBackend::replying("ok");
        let transcripts = StubTranscripts::with_texts(&["hello"]);
        let service = service(&backend, &transcripts);

        let err = service
            .turn(request(json!({ "videoId": "abc123", "message": "hi" })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InputValidationError");
        assert_eq!(transcripts.calls(), 0);

        let err = service.turn(TurnRequest::default()).await.unwrap_err();
        assert_eq!(err.kind(), "InputValidationError");
    }

    #[tokio::test]
    async fn test_last_user_message_used_when_message_absent() {
        let backend = ScriptedBackend::replying("ok");
        let service = service(&backend, &StubTranscripts::failing());

        service
            .turn(request(json!({
                "videoTitle": "Video",
                "videoTranscript": "some text",
                "messages": [
                    {"role": "user", "content": "first question"},
                    {"role": "assistant", "content": "first answer"},
                    {"role": "user", "content": "second question"}
                ]
            })))
            .await
            .unwrap();

        let sent = backend.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], "second question");
    }

    #[tokio::test]
    async fn test_fetched_transcript_grounds_session() {
        let backend = ScriptedBackend::replying("ok");
        let transcripts = StubTranscripts::with_texts(&[" first\n", "second  part "]);
        let service = service(&backend, &transcripts);

        service
            .turn(request(json!({
                "videoId": "abc123",
                "videoTitle": "Video",
                "videoChannel": "Channel",
                "message": "hi"
            })))
            .await
            .unwrap();

        assert_eq!(transcripts.calls(), 1);
        let sent = backend.sent();
        let priming = &sent[0];
        assert!(priming.contains("from the channel \"Channel\""));
        assert!(priming.ends_with("first second part"));
    }

    #[tokio::test]
    async fn test_no_transcript_fallback() {
        let backend = ScriptedBackend::replying("ok");
        let service = service(&backend, &StubTranscripts::failing());

        service
            .turn(request(json!({ "videoTitle": "Video", "message": "hi" })))
            .await
            .unwrap();
        assert!(backend.sent()[0].ends_with(NO_TRANSCRIPT));
    }

    #[tokio::test]
    async fn test_malformed_segment_rejected() {
        let backend = ScriptedBackend::replying("ok");
        let service = service(&backend, &StubTranscripts::failing());

        let err = service
            .turn(request(json!({
                "videoTitle": "Video",
                "videoTranscript": [{"text": "fine"}, {"offset": 10}],
                "message": "hi"
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::MalformedTranscriptSegment(ref e) if e.index == 1));
        assert_eq!(backend.channels_started(), 0);
    }

    #[tokio::test]
    async fn test_plain_text_transcript_control_characters_rejected() {
        let backend = ScriptedBackend::replying("ok");
        let service = service(&backend, &StubTranscripts::failing());

        let err = service
            .turn(request(json!({
                "videoTitle": "Video",
                "videoTranscript": "fine\u{0000}text",
                "message": "hi"
            })))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "MalformedTranscriptSegment");
        assert_eq!(backend.channels_started(), 0);

        service
            .turn(request(json!({
                "videoTitle": "Video",
                "videoTranscript": "line one\n\tline  two",
                "message": "hi"
            })))
            .await
            .unwrap();
        assert!(backend.sent()[0].ends_with("line one line two"));
    }

    #[tokio::test]
    async fn test_session_continues_without_repriming() {
        let backend = ScriptedBackend::replying("ok");
        let service = service(&backend, &StubTranscripts::failing());

        let first = service
            .turn(request(json!({ "videoTitle": "Video", "message": "one" })))
            .await
            .unwrap();
        let second = service
            .turn(request(json!({
                "sessionId": first.session_id.to_string(),
                "message": "two"
            })))
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);

        let sent = backend.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent.iter().filter(|m| m.starts_with(PRIMING_PREFIX)).count(),
            1
        );

        let snapshot = service.history(first.session_id).await.unwrap();
        assert_eq!(snapshot.state, PrimingState::Primed);
        assert_eq!(snapshot.history.len(), 4);
        assert_eq!(snapshot.history[2], ConversationMessage::user("two"));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let backend = ScriptedBackend::replying("ok");
        let service = service(&backend, &StubTranscripts::failing());
        let id = SessionId::new();

        let err = service
            .turn(TurnRequest {
                session_id: Some(id),
                message: Some("hi".to_string()),
                ..TurnRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound(missing) if missing == id));
        assert!(err.is_not_found());
        assert!(service.end_session(id).await.is_err());
    }

    #[tokio::test]
    async fn test_end_session_forgets_it() {
        let backend = ScriptedBackend::replying("ok");
        let service = service(&backend, &StubTranscripts::failing());

        let reply = service
            .turn(request(json!({ "videoTitle": "Video", "message": "hi" })))
            .await
            .unwrap();
        service.end_session(reply.session_id).await.unwrap();
        assert_eq!(service.session_count().await, 0);
        assert!(service.history(reply.session_id).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_first_turn_registers_nothing() {
        let backend = ScriptedBackend::replying("ok").fail_next("unavailable");
        let service = service(&backend, &StubTranscripts::failing());

        let err = service
            .turn(request(json!({ "videoTitle": "Video", "message": "hi" })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PrimingFailed");
        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_turn_timeout_is_backend_error() {
        let backend = ScriptedBackend::replying("late").with_latency_ms(200);
        let config = ChatConfig {
            turn_timeout: Duration::from_millis(20),
            ..ChatConfig::default()
        };
        let service = service_with(
            &config,
            &backend,
            &StubTranscripts::failing(),
            StubMetadata::missing(),
        );

        let err = service
            .turn(request(json!({ "videoTitle": "Video", "message": "hi" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::PrimingFailed(BackendError::Timeout(_))
                | ChatError::ChatBackend(BackendError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_transcript_view() {
        let backend = ScriptedBackend::replying("ok");
        let transcripts = StubTranscripts::with_texts(&["a  b", "c"]);
        let service = service(&backend, &transcripts);

        let view = service.transcript("vid").await.unwrap();
        assert_eq!(view.full_text, "a b c");
        assert_eq!(view.segments, 2);

        let err = service.transcript("  ").await.unwrap_err();
        assert_eq!(err.kind(), "InputValidationError");
    }

    #[tokio::test]
    async fn test_video_info() {
        let backend = ScriptedBackend::replying("ok");
        let transcripts = StubTranscripts::failing();
        let known = service_with(
            &ChatConfig::default(),
            &backend,
            &transcripts,
            StubMetadata::with("Title", "Channel"),
        );
        let info = known.video_info("vid").await.unwrap();
        assert_eq!(info.channel_title, "Channel");

        let unknown = service(&backend, &transcripts);
        let err = unknown.video_info("vid").await.unwrap_err();
        assert_eq!(err.kind(), "MetadataUnavailable");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ChatConfig {
            max_sessions: 0,
            ..ChatConfig::default()
        };
        let backend = ScriptedBackend::replying("ok");
        let result = ChatService::new(
            &config,
            ServiceBackends {
                chat: Arc::new(backend),
                transcripts: Arc::new(StubTranscripts::failing()),
                metadata: Arc::new(StubMetadata::missing()),
            },
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
