//! Grounding context preparation.

pub mod bounder;
pub mod priming;

pub use bounder::{ContextBounder, InvalidBudget, TRUNCATION_MARKER, bound};
pub use priming::{NO_TRANSCRIPT, PRIMING_PREFIX, VideoIdentity, build_priming_message};
