//! Head/tail preserving context bounding.
//!
//! Text longer than the budget keeps its first and last `budget / 2` characters with
//! [`TRUNCATION_MARKER`] between them; the middle is dropped. The marker is not
//! counted against the budget. Lengths are in characters, not bytes.

use thiserror::Error;

use crate::config::DEFAULT_MAX_CONTEXT_CHARS;

/// Literal placed where the middle of an over-long text was cut.
pub const TRUNCATION_MARKER: &str = "... [truncated] ...";

/// A budget that cannot hold any context.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("context budget must be greater than zero, got {0}")]
pub struct InvalidBudget(pub usize);

/// Bounds text to a fixed character budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextBounder {
    max_chars: usize,
}

impl Default for ContextBounder {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

impl ContextBounder {
    /// Create a bounder for `max_chars`.
    ///
    /// # Errors
    /// Returns [`InvalidBudget`] when `max_chars` is zero.
    pub const fn new(max_chars: usize) -> Result<Self, InvalidBudget> {
        if max_chars == 0 {
            return Err(InvalidBudget(max_chars));
        }
        Ok(Self { max_chars })
    }

    /// Configured budget.
    #[must_use]
    pub const fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Bound `text` to the budget. Text within budget is returned unchanged.
    #[must_use]
    pub fn bound(&self, text: &str) -> String {
        let total = text.chars().count();
        if total <= self.max_chars {
            return text.to_string();
        }

        let half = self.max_chars / 2;
        let head_end = byte_offset(text, half);
        let tail_start = byte_offset(text, total - half);

        let mut out = String::with_capacity(head_end + TRUNCATION_MARKER.len() + text.len() - tail_start);
        out.push_str(&text[..head_end]);
        out.push_str(TRUNCATION_MARKER);
        out.push_str(&text[tail_start..]);
        out
    }
}

/// Bound `text` to `max_chars` in one call.
///
/// # Errors
/// Returns [`InvalidBudget`] when `max_chars` is zero.
pub fn bound(text: &str, max_chars: usize) -> Result<String, InvalidBudget> {
    Ok(ContextBounder::new(max_chars)?.bound(text))
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(idx, _)| idx)
}
