//! Token-estimation port.
//!
//! The chunker only needs a deterministic text-to-count mapping; the real
//! tokenizer stays with the caller. A chars-per-token heuristic ships as a
//! usable fallback.

/// Approximate characters per token (conservative heuristic).
pub const CHARS_PER_TOKEN: usize = 4;

/// Capability mapping text to an estimated token count.
///
/// Must be deterministic: the chunker re-estimates growing slices of the
/// same input and relies on consistent accounting.
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count for `text`.
    fn count(&self, text: &str) -> usize;
}

/// Any plain `Fn(&str) -> usize` closure works as an estimator.
impl<F> TokenEstimator for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}

/// Chars-per-token heuristic estimator.
///
/// Rounds up, so short non-empty strings still count at least one token.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharsPerToken;

impl TokenEstimator for CharsPerToken {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(CHARS_PER_TOKEN)
    }
}
