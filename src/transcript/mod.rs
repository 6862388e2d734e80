//! Transcript acquisition and normalization.
//!
//! - `segment`: timed caption units and raw segment parsing
//! - `normalizer`: segments to one clean context string
//! - `provider`: transcript and metadata provider traits
//! - `youtube`: YouTube implementation of both providers
//! - `error`: provider errors

pub mod error;
pub mod normalizer;
pub mod provider;
pub mod segment;
pub mod youtube;

pub use error::{ProviderError, ProviderResult};
pub use normalizer::TranscriptNormalizer;
pub use provider::{MetadataProvider, ProviderFuture, TranscriptProvider, VideoMetadata};
pub use segment::{SegmentError, TranscriptSegment, parse_segments};
pub use youtube::YoutubeClient;
