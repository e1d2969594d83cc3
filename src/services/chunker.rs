//! Token-budget-aware chunking of oversized primary content.
//!
//! Splits the primary content into model-budget-sized slices, each
//! re-wrapped with the shared pre/post context. Continuation chunks carry a
//! truncation marker so the model knows it is looking at a boundary.

use tracing::{debug, warn};

use crate::domain::error::QueryError;
use crate::domain::ports::TokenEstimator;

/// Marker appended to every chunk after the first to signal a continuation
/// boundary.
pub const TRUNCATION_MARKER: &str = " [text truncated]\n";

/// Token budget governing where chunks close.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBudget {
    /// Total token window of the model.
    pub max_model_tokens: usize,

    /// Tokens reserved for the model's response.
    pub reserved_response_tokens: usize,
}

/// Split `primary` into budget-sized chunks, each wrapped with `pre`/`post`.
///
/// Scans the content one character boundary at a time, accumulating a token
/// estimate for the open slice. A chunk closes as soon as
/// `slice + pre + post + reserved` exceeds the model window, or at the end
/// of input regardless of size. Boundaries are monotonic and cover the whole
/// input; concatenating the kept slices (ignoring markers and wrapping)
/// reconstructs `primary` exactly.
///
/// # Errors
/// [`QueryError::InvalidInput`] when `primary` is empty.
pub fn chunk_content(
    primary: &str,
    pre: &str,
    post: &str,
    estimator: &dyn TokenEstimator,
    budget: &ChunkBudget,
) -> Result<Vec<String>, QueryError> {
    if primary.is_empty() {
        return Err(QueryError::InvalidInput(
            "primary content must be a non-empty string".to_string(),
        ));
    }

    let pre_tokens = if pre.is_empty() { 0 } else { estimator.count(pre) };
    let post_tokens = if post.is_empty() { 0 } else { estimator.count(post) };
    let overhead = pre_tokens + post_tokens + budget.reserved_response_tokens;
    if overhead >= budget.max_model_tokens {
        warn!(
            overhead,
            max_model_tokens = budget.max_model_tokens,
            "wrapping context and reserved response leave no token room for content"
        );
    }

    let mut chunks = Vec::new();
    let mut chunk_start = 0;

    // Candidate close positions: every char boundary past the start, plus
    // the end of input. The slice that trips the budget is the slice kept.
    let positions = primary
        .char_indices()
        .map(|(pos, _)| pos)
        .skip(1)
        .chain(std::iter::once(primary.len()));

    for pos in positions {
        let slice_tokens = estimator.count(&primary[chunk_start..pos]);
        let over_budget = slice_tokens + overhead > budget.max_model_tokens;

        if over_budget || pos == primary.len() {
            let mut piece = primary[chunk_start..pos].to_string();
            if chunk_start > 0 {
                piece.push_str(TRUNCATION_MARKER);
            }
            chunks.push(wrap(pre, &piece, post));
            chunk_start = pos;
        }
    }

    debug!(
        chunks = chunks.len(),
        primary_len = primary.len(),
        "chunked primary content"
    );
    Ok(chunks)
}

/// Wrap a content slice with the shared pre/post context, newline-separated.
fn wrap(pre: &str, piece: &str, post: &str) -> String {
    let mut out = String::with_capacity(pre.len() + piece.len() + post.len() + 2);
    if !pre.is_empty() {
        out.push_str(pre);
        out.push('\n');
    }
    out.push_str(piece);
    if !post.is_empty() {
        out.push('\n');
        out.push_str(post);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One token per character, so budgets translate directly to lengths.
    fn char_estimator() -> impl TokenEstimator {
        |text: &str| text.len()
    }

    #[test]
    fn test_empty_primary_is_invalid_input() {
        let budget = ChunkBudget {
            max_model_tokens: 100,
            reserved_response_tokens: 10,
        };
        let result = chunk_content("", "", "", &char_estimator(), &budget);
        assert!(matches!(result, Err(QueryError::InvalidInput(_))));
    }

    #[test]
    fn test_fitting_input_yields_one_unmarked_chunk() {
        let budget = ChunkBudget {
            max_model_tokens: 100,
            reserved_response_tokens: 10,
        };
        let chunks = chunk_content("hello world", "", "", &char_estimator(), &budget).unwrap();
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_fitting_input_is_wrapped_with_pre_and_post() {
        let budget = ChunkBudget {
            max_model_tokens: 100,
            reserved_response_tokens: 10,
        };
        let chunks = chunk_content("body", "pre", "post", &char_estimator(), &budget).unwrap();
        assert_eq!(chunks, vec!["pre\nbody\npost".to_string()]);
    }

    #[test]
    fn test_two_chunk_split_reconstructs_primary() {
        let budget = ChunkBudget {
            max_model_tokens: 10,
            reserved_response_tokens: 4,
        };
        // Budget leaves 6 tokens of content; the slice that trips the budget
        // (7 chars) is kept, the rest lands in the continuation chunk.
        let primary = "aaaaaaabbb";
        let chunks = chunk_content(primary, "", "", &char_estimator(), &budget).unwrap();
        assert_eq!(chunks.len(), 2);

        // Continuation chunk ends with the truncation marker.
        assert!(chunks[1].ends_with(TRUNCATION_MARKER));

        // Stripping markers and concatenating slices reconstructs the input.
        let reconstructed: String = chunks
            .iter()
            .map(|chunk| chunk.strip_suffix(TRUNCATION_MARKER).unwrap_or(chunk))
            .collect();
        assert_eq!(reconstructed, primary);
    }

    #[test]
    fn test_pre_and_post_tokens_count_against_budget() {
        let budget = ChunkBudget {
            max_model_tokens: 20,
            reserved_response_tokens: 0,
        };
        // With 8 tokens of wrapping, only 12 remain for content per chunk.
        let with_wrap =
            chunk_content("abcdefghijklmnop", "ppp", "qqqq", &char_estimator(), &budget).unwrap();
        let without_wrap =
            chunk_content("abcdefghijklmnop", "", "", &char_estimator(), &budget).unwrap();
        assert!(with_wrap.len() > without_wrap.len());
        for chunk in &with_wrap {
            assert!(chunk.starts_with("ppp\n"));
            assert!(chunk.ends_with("\nqqqq"));
        }
    }

    #[test]
    fn test_multibyte_content_splits_on_char_boundaries() {
        let budget = ChunkBudget {
            max_model_tokens: 8,
            reserved_response_tokens: 0,
        };
        let primary = "héllo wörld ünïcode";
        let chunks = chunk_content(primary, "", "", &char_estimator(), &budget).unwrap();
        assert!(chunks.len() > 1);
        let reconstructed: String = chunks
            .iter()
            .map(|chunk| chunk.strip_suffix(TRUNCATION_MARKER).unwrap_or(chunk))
            .collect();
        assert_eq!(reconstructed, primary);
    }

    #[test]
    fn test_oversized_single_token_budget_still_covers_input() {
        // Overhead alone exceeds the window; every boundary trips the budget
        // but the input is still fully covered.
        let budget = ChunkBudget {
            max_model_tokens: 2,
            reserved_response_tokens: 10,
        };
        let primary = "abc";
        let chunks = chunk_content(primary, "", "", &char_estimator(), &budget).unwrap();
        assert!(!chunks.is_empty());
        let reconstructed: String = chunks
            .iter()
            .map(|chunk| chunk.strip_suffix(TRUNCATION_MARKER).unwrap_or(chunk))
            .collect();
        assert_eq!(reconstructed, primary);
    }
}
