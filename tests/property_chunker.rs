//! Property tests for chunking coverage and list render/parse stability.

use proptest::prelude::*;

use shepherd::models::Validation;
use shepherd::ports::TokenEstimator;
use shepherd::validator;
use shepherd::{chunk_content, ChunkBudget, TRUNCATION_MARKER};

/// One token per byte, so budgets translate directly to lengths.
fn char_estimator() -> impl TokenEstimator {
    |text: &str| text.len()
}

/// Strip the continuation marker from every chunk after the first and
/// concatenate the slices.
fn reconstruct(chunks: &[String]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            if index > 0 {
                chunk.strip_suffix(TRUNCATION_MARKER).expect("marker on continuation chunk")
            } else {
                chunk.as_str()
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn property_chunking_loses_no_characters(primary in ".{1,300}") {
        let budget = ChunkBudget {
            max_model_tokens: 16,
            reserved_response_tokens: 4,
        };
        let chunks = chunk_content(&primary, "", "", &char_estimator(), &budget).unwrap();
        prop_assert!(!chunks.is_empty());
        prop_assert_eq!(reconstruct(&chunks), primary);
    }

    #[test]
    fn property_fitting_input_stays_one_chunk(primary in "[a-z]{1,12}") {
        let budget = ChunkBudget {
            max_model_tokens: 16,
            reserved_response_tokens: 4,
        };
        let chunks = chunk_content(&primary, "", "", &char_estimator(), &budget).unwrap();
        prop_assert_eq!(chunks, vec![primary]);
    }

    #[test]
    fn property_wrapping_never_splits_characters(primary in "\\PC{1,120}") {
        let budget = ChunkBudget {
            max_model_tokens: 24,
            reserved_response_tokens: 8,
        };
        // Multibyte inputs must still split on character boundaries; the
        // slicing itself panics on a violation.
        let chunks =
            chunk_content(&primary, "pre", "post", &char_estimator(), &budget).unwrap();
        for chunk in &chunks {
            prop_assert!(chunk.starts_with("pre\n"));
            prop_assert!(chunk.ends_with("\npost"));
        }
    }

    #[test]
    fn property_numbered_render_parse_round_trips(
        items in proptest::collection::vec("[a-z]{1,10}", 1..8)
    ) {
        let rendered = items
            .iter()
            .enumerate()
            .map(|(index, item)| format!("{}. {item}", index + 1))
            .collect::<Vec<_>>()
            .join("\n");
        prop_assert_eq!(validator::numbered_list(&rendered), Validation::List(items));
    }
}
