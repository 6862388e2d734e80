//! Timed caption segments.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One caption unit from the transcript provider, in source order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Caption text as delivered by the provider.
    pub text: String,
    /// Start of the caption relative to the beginning of the video.
    #[serde(with = "millis")]
    pub offset: Duration,
    /// How long the caption stays on screen.
    #[serde(with = "millis")]
    pub length: Duration,
}

impl TranscriptSegment {
    /// Build a segment.
    #[must_use]
    pub fn new(text: impl Into<String>, offset: Duration, length: Duration) -> Self {
        Self {
            text: text.into(),
            offset,
            length,
        }
    }

    /// Build a segment with no timing information.
    #[must_use]
    pub fn untimed(text: impl Into<String>) -> Self {
        Self::new(text, Duration::ZERO, Duration::ZERO)
    }
}

/// A segment that cannot be used as grounding.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("malformed transcript segment at index {index}: {reason}")]
pub struct SegmentError {
    /// Position of the offending segment.
    pub index: usize,
    /// What is wrong with it.
    pub reason: String,
}

impl SegmentError {
    pub(crate) fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

/// Parse caller-supplied raw segments (`{ text, offset?, duration? }`, times in ms).
///
/// Fails on the first segment without a string `text` rather than skipping it.
pub fn parse_segments(values: &[Value]) -> Result<Vec<TranscriptSegment>, SegmentError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| parse_segment(index, value))
        .collect()
}

fn parse_segment(index: usize, value: &Value) -> Result<TranscriptSegment, SegmentError> {
    let object = value
        .as_object()
        .ok_or_else(|| SegmentError::new(index, "segment is not an object"))?;

    let text = object
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| SegmentError::new(index, "missing text field"))?;

    let offset = parse_millis(index, object.get("offset"), "offset")?;
    let length = parse_millis(
        index,
        object.get("duration").or_else(|| object.get("length")),
        "duration",
    )?;

    Ok(TranscriptSegment::new(text, offset, length))
}

fn parse_millis(index: usize, value: Option<&Value>, field: &str) -> Result<Duration, SegmentError> {
    let Some(value) = value else {
        return Ok(Duration::ZERO);
    };
    value
        .as_f64()
        .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
        .ok_or_else(|| SegmentError::new(index, format!("invalid {field}")))
}

/// Serde module for millisecond durations.
mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
