//! Session coordinator: priming once, then relaying turns in order.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::chat::backend::ChatBackend;
use crate::chat::error::{BackendResult, ChatError, ChatResult};
use crate::chat::session::{PrimingState, Session, SessionInner};
use crate::context::{ContextBounder, VideoIdentity, build_priming_message};

/// Drives sessions against one backend.
pub struct SessionCoordinator {
    backend: Arc<dyn ChatBackend>,
    bounder: ContextBounder,
}

impl SessionCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub const fn new(backend: Arc<dyn ChatBackend>, bounder: ContextBounder) -> Self {
        Self { backend, bounder }
    }

    /// Open a backend channel for a new, unprimed session. Nothing is sent yet.
    pub fn start(
        &self,
        video: VideoIdentity,
        normalized_transcript: impl Into<String>,
    ) -> ChatResult<Session> {
        let channel = self.backend.start_channel().map_err(|err| {
            error!("Failed to open {} channel: {err}", self.backend.name());
            ChatError::ChatBackend(err)
        })?;

        let session = Session::new(video, normalized_transcript.into(), channel);
        info!(
            "Started session {} for \"{}\" ({} transcript chars)",
            session.id(),
            session.video().title,
            session.grounding().chars().count()
        );
        Ok(session)
    }

    /// Send the grounding context if the session is not primed yet.
    ///
    /// Does nothing on a primed session.
    pub async fn prime(&self, session: &Session) -> ChatResult<()> {
        let mut inner = session.lock().await;
        self.ensure_primed(session, &mut inner)
            .await
            .map_err(ChatError::ChatBackend)
    }

    /// Relay one user message and return the assistant reply unmodified.
    ///
    /// Primes the session first when needed. A priming failure fails the turn with
    /// [`ChatError::PrimingFailed`] and leaves the session unprimed; a failure of
    /// the message itself leaves the priming state untouched.
    pub async fn turn(&self, session: &Session, user_message: &str) -> ChatResult<String> {
        if user_message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut inner = session.lock().await;
        self.ensure_primed(session, &mut inner)
            .await
            .map_err(ChatError::PrimingFailed)?;

        match inner.channel.send(user_message).await {
            Ok(reply) => {
                inner.record_turn(user_message, &reply);
                debug!(
                    "Session {} turn {} answered",
                    session.id(),
                    inner.history.len() / 2
                );
                Ok(reply)
            }
            Err(err) => {
                error!("Session {} turn failed: {err}", session.id());
                Err(ChatError::ChatBackend(err))
            }
        }
    }

    async fn ensure_primed(&self, session: &Session, inner: &mut SessionInner) -> BackendResult<()> {
        if inner.state == PrimingState::Primed {
            return Ok(());
        }

        let context = self.bounder.bound(session.grounding());
        let message = build_priming_message(session.video(), &context);

        inner.begin_priming();
        match inner.channel.send(&message).await {
            Ok(reply) => {
                inner.finish_priming(true);
                debug!(
                    "Session {} primed ({} chars), reply discarded: {} chars",
                    session.id(),
                    message.chars().count(),
                    reply.chars().count()
                );
                Ok(())
            }
            Err(err) => {
                inner.finish_priming(false);
                warn!(
                    "Session {} priming attempt {} failed: {err}",
                    session.id(),
                    inner.priming_attempts
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::error::BackendError;
    use crate::chat::message::ConversationMessage;
    use crate::chat::testing::ScriptedBackend;
    use crate::context::{PRIMING_PREFIX, TRUNCATION_MARKER};

    fn coordinator(backend: &ScriptedBackend) -> SessionCoordinator {
        SessionCoordinator::new(Arc::new(backend.clone()), ContextBounder::default())
    }

    #[tokio::test]
    async fn test_start_sends_nothing() {
        let backend = ScriptedBackend::replying("ok");
        let coordinator = coordinator(&backend);
        let session = coordinator
            .start(VideoIdentity::titled("Video"), "transcript")
            .unwrap();
        assert_eq!(session.state().await, PrimingState::Unprimed);
        assert!(backend.sent().is_empty());
        assert_eq!(backend.channels_started(), 1);
    }

    #[tokio::test]
    async fn test_channel_start_failure_is_backend_error() {
        let backend = ScriptedBackend::replying("ok").refusing_channels();
        let err = coordinator(&backend)
            .start(VideoIdentity::titled("Video"), "")
            .unwrap_err();
        assert_eq!(err.kind(), "ChatBackendError");
    }

    #[tokio::test]
    async fn test_primes_once_across_turns() {
        let backend = ScriptedBackend::replying("sure");
        let coordinator = coordinator(&backend);
        let session = coordinator
            .start(VideoIdentity::titled("Video"), "some transcript")
            .unwrap();

        for message in ["one", "two", "three", "four"] {
            assert_eq!(coordinator.turn(&session, message).await.unwrap(), "sure");
        }
        coordinator.prime(&session).await.unwrap();

        let priming_sends = backend
            .sent()
            .iter()
            .filter(|m| m.starts_with(PRIMING_PREFIX))
            .count();
        assert_eq!(priming_sends, 1);
        assert_eq!(backend.sent().len(), 5);
        assert_eq!(session.priming_attempts().await, 1);
    }

    #[tokio::test]
    async fn test_turns_reach_backend_in_order() {
        let backend = ScriptedBackend::replying("noted");
        let coordinator = coordinator(&backend);
        let session = coordinator
            .start(VideoIdentity::titled("Video"), "transcript")
            .unwrap();

        let script = ["What is the video about?", "Summarize minute 2", "Thanks"];
        for message in script {
            coordinator.turn(&session, message).await.unwrap();
        }

        let sent = backend.sent();
        assert!(sent[0].starts_with(PRIMING_PREFIX));
        assert_eq!(&sent[1..], &script);

        let history = session.history().await;
        assert_eq!(history.len(), 6);
        assert_eq!(history[0], ConversationMessage::user("What is the video about?"));
        assert_eq!(history[5], ConversationMessage::assistant("noted"));
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_serialized() {
        let backend = ScriptedBackend::replying("ok").with_latency_ms(5);
        let coordinator = Arc::new(coordinator(&backend));
        let session = Arc::new(
            coordinator
                .start(VideoIdentity::titled("Video"), "transcript")
                .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move {
                coordinator.turn(&session, &format!("message {i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.max_in_flight(), 1);
        let sent = backend.sent();
        assert_eq!(sent.len(), 6);
        assert_eq!(
            sent.iter().filter(|m| m.starts_with(PRIMING_PREFIX)).count(),
            1
        );
        assert!(sent[0].starts_with(PRIMING_PREFIX));
    }

    #[tokio::test]
    async fn test_empty_message_never_reaches_backend() {
        let backend = ScriptedBackend::replying("ok");
        let coordinator = coordinator(&backend);
        let session = coordinator
            .start(VideoIdentity::titled("Video"), "transcript")
            .unwrap();

        for message in ["", "   \n"] {
            let err = coordinator.turn(&session, message).await.unwrap_err();
            assert!(matches!(err, ChatError::EmptyMessage));
        }
        assert!(backend.sent().is_empty());
        assert_eq!(session.state().await, PrimingState::Unprimed);
    }

    #[tokio::test]
    async fn test_priming_failure_retried_on_next_turn() {
        let backend = ScriptedBackend::replying("fine").fail_next("backend down");
        let coordinator = coordinator(&backend);
        let session = coordinator
            .start(VideoIdentity::titled("Video"), "transcript")
            .unwrap();

        let err = coordinator.turn(&session, "hello?").await.unwrap_err();
        assert!(matches!(err, ChatError::PrimingFailed(BackendError::Rejected(_))));
        assert_eq!(session.state().await, PrimingState::Unprimed);
        assert_eq!(backend.sent().len(), 1);
        assert!(session.history().await.is_empty());

        assert_eq!(coordinator.turn(&session, "hello?").await.unwrap(), "fine");
        assert_eq!(session.state().await, PrimingState::Primed);
        assert_eq!(session.priming_attempts().await, 2);

        let sent = backend.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent[1].starts_with(PRIMING_PREFIX));
        assert_eq!(sent[2], "hello?");
    }

    #[tokio::test]
    async fn test_explicit_prime_failure_is_backend_error() {
        let backend = ScriptedBackend::replying("ok").fail_next("timeout");
        let coordinator = coordinator(&backend);
        let session = coordinator
            .start(VideoIdentity::titled("Video"), "transcript")
            .unwrap();

        let err = coordinator.prime(&session).await.unwrap_err();
        assert_eq!(err.kind(), "ChatBackendError");
        coordinator.prime(&session).await.unwrap();
        assert_eq!(session.state().await, PrimingState::Primed);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_session_primed() {
        let backend = ScriptedBackend::replying("ok");
        let coordinator = coordinator(&backend);
        let session = coordinator
            .start(VideoIdentity::titled("Video"), "transcript")
            .unwrap();
        coordinator.prime(&session).await.unwrap();

        backend.script_failure("overloaded");
        let err = coordinator.turn(&session, "first try").await.unwrap_err();
        assert!(matches!(err, ChatError::ChatBackend(_)));
        assert_eq!(session.state().await, PrimingState::Primed);
        assert!(session.history().await.is_empty());

        assert_eq!(coordinator.turn(&session, "second try").await.unwrap(), "ok");
        let priming_sends = backend
            .sent()
            .iter()
            .filter(|m| m.starts_with(PRIMING_PREFIX))
            .count();
        assert_eq!(priming_sends, 1);
    }

    #[tokio::test]
    async fn test_priming_uses_bounded_context() {
        let backend = ScriptedBackend::replying("ok");
        let coordinator =
            SessionCoordinator::new(Arc::new(backend.clone()), ContextBounder::new(20).unwrap());
        let transcript = "a".repeat(15) + &"b".repeat(30) + &"c".repeat(15);
        let session = coordinator
            .start(VideoIdentity::titled("Long"), transcript)
            .unwrap();
        coordinator.prime(&session).await.unwrap();

        let sent = backend.sent();
        let priming = &sent[0];
        let expected = format!("aaaaaaaaaa{TRUNCATION_MARKER}cccccccccc");
        assert!(priming.ends_with(&expected));
        let (_, context) = priming.split_once("transcript: ").unwrap();
        assert_eq!(context, expected);
        assert!(!context.contains('b'));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let backend = ScriptedBackend::replying("ok");
        let coordinator = coordinator(&backend);
        let first = coordinator
            .start(VideoIdentity::titled("First"), "one")
            .unwrap();
        let second = coordinator
            .start(VideoIdentity::titled("Second"), "two")
            .unwrap();

        coordinator.turn(&first, "hi").await.unwrap();
        assert_eq!(first.state().await, PrimingState::Primed);
        assert_eq!(second.state().await, PrimingState::Unprimed);
        assert_eq!(backend.channels_started(), 2);
    }
}
