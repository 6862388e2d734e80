//! Provider abstractions for captions and video metadata.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::transcript::error::ProviderResult;
use crate::transcript::segment::TranscriptSegment;

/// Boxed future type for provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Public metadata of a video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// Video title.
    pub title: String,
    /// Name of the channel that published the video.
    pub channel_title: String,
    /// Video description.
    pub description: String,
}

/// Source of timed captions.
pub trait TranscriptProvider: Send + Sync {
    /// Fetch the ordered caption segments of a video.
    ///
    /// # Errors
    /// Returns an error if captions cannot be retrieved.
    fn fetch_transcript<'a>(
        &'a self,
        video_id: &'a str,
    ) -> ProviderFuture<'a, ProviderResult<Vec<TranscriptSegment>>>;
}

/// Source of video metadata.
pub trait MetadataProvider: Send + Sync {
    /// Fetch title, channel and description of a video.
    ///
    /// # Errors
    /// Returns an error if the video is unknown or the lookup fails.
    fn fetch_metadata<'a>(&'a self, video_id: &'a str)
    -> ProviderFuture<'a, ProviderResult<VideoMetadata>>;
}
