//! YouTube captions and metadata.
//!
//! Captions come from the track list embedded in the watch page, downloaded in
//! `json3` format. Metadata comes from the Data API v3 and needs an API key.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::YoutubeConfig;
use crate::transcript::error::{ProviderError, ProviderResult};
use crate::transcript::provider::{
    MetadataProvider, ProviderFuture, TranscriptProvider, VideoMetadata,
};
use crate::transcript::segment::TranscriptSegment;

const WATCH_URL: &str = "https://www.youtube.com/watch";
const DATA_API_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const API_KEY_HEADER: &str = "x-goog-api-key";
const PLAYER_RESPONSE_MARKER: &str = "ytInitialPlayerResponse = ";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One caption track advertised by the player.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CaptionTrack {
    base_url: String,
    language_code: String,
    auto_generated: bool,
}

/// YouTube client implementing both providers.
pub struct YoutubeClient {
    client: reqwest::Client,
    api_key: Option<String>,
    language: String,
}

impl YoutubeClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &YoutubeConfig) -> ProviderResult<Self> {
        use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

        let mut headers = HeaderMap::new();
        if let Ok(lang) = HeaderValue::from_str(&format!("{},en;q=0.5", config.language)) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| ProviderError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            language: config.language.clone(),
        })
    }

    async fn transcript(&self, video_id: &str) -> ProviderResult<Vec<TranscriptSegment>> {
        let url = format!("{WATCH_URL}?v={}", urlencoding::encode(video_id));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let html = response.text().await?;
        let player = parse_player_response(&html)?;
        check_playability(&player, video_id)?;

        let tracks = caption_tracks(&player);
        let track = select_track(&tracks, &self.language)
            .ok_or_else(|| ProviderError::CaptionsUnavailable(video_id.to_string()))?;
        debug!(
            "Fetching {} captions for {video_id} (auto: {})",
            track.language_code, track.auto_generated
        );

        let response = self
            .client
            .get(format!("{}&fmt=json3", track.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let json: Value = response.json().await?;
        let segments = parse_json3(&json);
        if segments.is_empty() {
            warn!("Caption track for {video_id} is empty");
        }
        Ok(segments)
    }

    async fn metadata(&self, video_id: &str) -> ProviderResult<VideoMetadata> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::ApiKeyRequired("YouTube Data API".to_string()))?;

        let response = self
            .client
            .execute(self.metadata_request(video_id, api_key)?)
            .await?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::AccessDenied(
                "YouTube API quota exceeded or invalid key".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let json: Value = response.json().await?;
        parse_video_snippet(&json, video_id)
    }
}

impl YoutubeClient {
    /// Data API request for one video; the key travels in a header, never in the URL.
    fn metadata_request(&self, video_id: &str, api_key: &str) -> ProviderResult<reqwest::Request> {
        let url = format!(
            "{DATA_API_URL}?part=snippet&id={}",
            urlencoding::encode(video_id)
        );
        Ok(self
            .client
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .build()?)
    }
}

impl TranscriptProvider for YoutubeClient {
    fn fetch_transcript<'a>(
        &'a self,
        video_id: &'a str,
    ) -> ProviderFuture<'a, ProviderResult<Vec<TranscriptSegment>>> {
        Box::pin(self.transcript(video_id))
    }
}

impl MetadataProvider for YoutubeClient {
    fn fetch_metadata<'a>(
        &'a self,
        video_id: &'a str,
    ) -> ProviderFuture<'a, ProviderResult<VideoMetadata>> {
        Box::pin(self.metadata(video_id))
    }
}

/// Extract the player response JSON embedded in a watch page.
///
/// Only the first JSON value after the marker is read; whatever script follows it is ignored.
fn parse_player_response(html: &str) -> ProviderResult<Value> {
    let start = html
        .find(PLAYER_RESPONSE_MARKER)
        .map(|pos| pos + PLAYER_RESPONSE_MARKER.len())
        .ok_or_else(|| ProviderError::UnexpectedLayout("no player response".to_string()))?;

    serde_json::Deserializer::from_str(&html[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| ProviderError::UnexpectedLayout("empty player response".to_string()))?
        .map_err(ProviderError::from)
}

fn check_playability(player: &Value, video_id: &str) -> ProviderResult<()> {
    let status = player
        .get("playabilityStatus")
        .and_then(|p| p.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("OK");

    match status {
        "ERROR" => Err(ProviderError::VideoNotFound(video_id.to_string())),
        "LOGIN_REQUIRED" => Err(ProviderError::AccessDenied(format!(
            "video {video_id} requires sign-in"
        ))),
        _ => Ok(()),
    }
}

fn caption_tracks(player: &Value) -> Vec<CaptionTrack> {
    player
        .get("captions")
        .and_then(|c| c.get("playerCaptionsTracklistRenderer"))
        .and_then(|r| r.get("captionTracks"))
        .and_then(Value::as_array)
        .map(|tracks| {
            tracks
                .iter()
                .filter_map(|track| {
                    Some(CaptionTrack {
                        base_url: track.get("baseUrl")?.as_str()?.to_string(),
                        language_code: track
                            .get("languageCode")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        auto_generated: track.get("kind").and_then(Value::as_str) == Some("asr"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Prefer a manual track in the wanted language, then an automatic one, then anything.
fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let in_language = |t: &&CaptionTrack| t.language_code == language;
    tracks
        .iter()
        .filter(in_language)
        .find(|t| !t.auto_generated)
        .or_else(|| tracks.iter().find(in_language))
        .or_else(|| tracks.first())
}

/// Convert a `json3` caption document to segments, skipping non-text events.
fn parse_json3(json: &Value) -> Vec<TranscriptSegment> {
    let Some(events) = json.get("events").and_then(Value::as_array) else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(|event| {
            let segs = event.get("segs")?.as_array()?;
            let text: String = segs
                .iter()
                .filter_map(|s| s.get("utf8").and_then(Value::as_str))
                .collect();
            if text.trim().is_empty() {
                return None;
            }
            let offset = event.get("tStartMs").and_then(Value::as_u64).unwrap_or(0);
            let length = event.get("dDurationMs").and_then(Value::as_u64).unwrap_or(0);
            Some(TranscriptSegment::new(
                text,
                Duration::from_millis(offset),
                Duration::from_millis(length),
            ))
        })
        .collect()
}

/// Parse a Data API `videos` response.
fn parse_video_snippet(json: &Value, video_id: &str) -> ProviderResult<VideoMetadata> {
    let snippet = json
        .get("items")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("snippet"))
        .ok_or_else(|| ProviderError::VideoNotFound(video_id.to_string()))?;

    let field = |name: &str| {
        snippet
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(VideoMetadata {
        title: field("title"),
        channel_title: field("channelTitle"),
        description: field("description"),
    })
}
