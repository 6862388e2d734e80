//! Transcript normalization into a single context blob.

use regex::Regex;
use tracing::warn;

use crate::transcript::segment::{SegmentError, TranscriptSegment};

/// Turns ordered caption segments into one clean string.
///
/// Segments are trimmed, joined with single spaces and every whitespace run is
/// collapsed, so the output never has leading, trailing or repeated whitespace.
/// Segment order is kept exactly as given.
pub struct TranscriptNormalizer {
    whitespace: Regex,
}

impl TranscriptNormalizer {
    /// Create a normalizer.
    ///
    /// # Errors
    /// Returns an error if the whitespace pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            whitespace: Regex::new(r"\s+")?,
        })
    }

    /// Normalize an ordered sequence of segments.
    ///
    /// An empty sequence yields an empty string. A segment carrying control
    /// characters other than tab, newline or carriage return is rejected.
    pub fn normalize(&self, segments: &[TranscriptSegment]) -> Result<String, SegmentError> {
        let mut previous_offset = None;
        let mut parts = Vec::with_capacity(segments.len());

        for (index, segment) in segments.iter().enumerate() {
            if let Some(ch) = segment.text.chars().find(|c| is_forbidden_control(*c)) {
                return Err(SegmentError::new(
                    index,
                    format!("control character U+{:04X} in text", u32::from(ch)),
                ));
            }

            if previous_offset.is_some_and(|prev| segment.offset < prev) {
                warn!("Transcript segment {index} starts before its predecessor, keeping order");
            }
            previous_offset = Some(segment.offset);

            parts.push(segment.text.trim());
        }

        Ok(self.normalize_text(&parts.join(" ")))
    }

    /// Collapse whitespace runs in already-joined text and trim it.
    #[must_use]
    pub fn normalize_text(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }
}

fn is_forbidden_control(ch: char) -> bool {
    ch.is_control() && !matches!(ch, '\t' | '\n' | '\r')
}
