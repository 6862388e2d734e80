//! Scripted collaborators for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::chat::backend::{BackendFuture, ChatBackend, ChatChannel};
use crate::chat::error::{BackendError, BackendResult};
use crate::transcript::{
    MetadataProvider, ProviderError, ProviderFuture, ProviderResult, TranscriptProvider,
    TranscriptSegment, VideoMetadata,
};

#[derive(Default)]
struct Script {
    sent: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<String>>,
    channels: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Backend that records every message and answers with a fixed reply,
/// unless a failure has been scripted for the next send.
#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    script: Arc<Script>,
    reply: String,
    latency: Duration,
    refuse_channels: bool,
}

impl ScriptedBackend {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            script: Arc::default(),
            reply: reply.to_string(),
            latency: Duration::ZERO,
            refuse_channels: false,
        }
    }

    pub(crate) fn with_latency_ms(mut self, millis: u64) -> Self {
        self.latency = Duration::from_millis(millis);
        self
    }

    pub(crate) fn refusing_channels(mut self) -> Self {
        self.refuse_channels = true;
        self
    }

    pub(crate) fn fail_next(self, reason: &str) -> Self {
        self.script_failure(reason);
        self
    }

    pub(crate) fn script_failure(&self, reason: &str) {
        self.script
            .failures
            .lock()
            .unwrap()
            .push_back(reason.to_string());
    }

    /// Every message sent on any channel, in send order.
    pub(crate) fn sent(&self) -> Vec<String> {
        self.script.sent.lock().unwrap().clone()
    }

    pub(crate) fn channels_started(&self) -> usize {
        self.script.channels.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.script.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ChatBackend for ScriptedBackend {
    fn start_channel(&self) -> BackendResult<Box<dyn ChatChannel>> {
        if self.refuse_channels {
            return Err(BackendError::MissingApiKey("scripted"));
        }
        self.script.channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedChannel {
            backend: self.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedChannel {
    backend: ScriptedBackend,
}

impl ChatChannel for ScriptedChannel {
    fn send<'a>(&'a mut self, message: &'a str) -> BackendFuture<'a, BackendResult<String>> {
        Box::pin(async move {
            let script = &self.backend.script;
            let now = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            script.max_in_flight.fetch_max(now, Ordering::SeqCst);
            script.sent.lock().unwrap().push(message.to_string());

            if !self.backend.latency.is_zero() {
                tokio::time::sleep(self.backend.latency).await;
            }

            script.in_flight.fetch_sub(1, Ordering::SeqCst);
            let failure = script.failures.lock().unwrap().pop_front();
            match failure {
                Some(reason) => Err(BackendError::Rejected(reason)),
                None => Ok(self.backend.reply.clone()),
            }
        })
    }
}

/// Transcript provider returning fixed segments or failing, counting calls.
#[derive(Clone, Default)]
pub(crate) struct StubTranscripts {
    segments: Option<Vec<TranscriptSegment>>,
    calls: Arc<AtomicUsize>,
}

impl StubTranscripts {
    pub(crate) fn with_texts(texts: &[&str]) -> Self {
        Self {
            segments: Some(texts.iter().map(|t| TranscriptSegment::untimed(*t)).collect()),
            calls: Arc::default(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TranscriptProvider for StubTranscripts {
    fn fetch_transcript<'a>(
        &'a self,
        video_id: &'a str,
    ) -> ProviderFuture<'a, ProviderResult<Vec<TranscriptSegment>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.segments
                .clone()
                .ok_or_else(|| ProviderError::CaptionsUnavailable(video_id.to_string()))
        })
    }
}

/// Metadata provider returning fixed metadata or "not found".
#[derive(Clone, Default)]
pub(crate) struct StubMetadata {
    metadata: Option<VideoMetadata>,
}

impl StubMetadata {
    pub(crate) fn with(title: &str, channel: &str) -> Self {
        Self {
            metadata: Some(VideoMetadata {
                title: title.to_string(),
                channel_title: channel.to_string(),
                description: format!("About {title}"),
            }),
        }
    }

    pub(crate) fn missing() -> Self {
        Self::default()
    }
}

impl MetadataProvider for StubMetadata {
    fn fetch_metadata<'a>(
        &'a self,
        video_id: &'a str,
    ) -> ProviderFuture<'a, ProviderResult<VideoMetadata>> {
        Box::pin(async move {
            self.metadata
                .clone()
                .ok_or_else(|| ProviderError::VideoNotFound(video_id.to_string()))
        })
    }
}
