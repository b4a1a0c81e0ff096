//! Property-based tests for summary normalization

use proptest::prelude::*;
use summa::summary::SummaryPolicy;

fn summary_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[A-Za-z]{1,8}",
            Just(". ".to_string()),
            Just("! ".to_string()),
            Just("? ".to_string()),
            Just("\"".to_string()),
            Just("'".to_string()),
            Just(" ".to_string()),
            Just("\n\t".to_string()),
            Just("...".to_string()),
        ],
        0..30,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn normalize_is_idempotent(raw in summary_text(), max_words in 1usize..25) {
        let policy = SummaryPolicy { min_chars: 5, max_words };
        let once = policy.normalize(&raw);
        prop_assert_eq!(policy.normalize(&once), once);
    }

    #[test]
    fn normalized_summaries_are_single_capped_sentences(
        raw in summary_text(),
        max_words in 1usize..25,
    ) {
        let policy = SummaryPolicy { min_chars: 5, max_words };
        let normalized = policy.normalize(&raw);
        prop_assert!(normalized.ends_with('.'));
        prop_assert!(normalized.split_whitespace().count() <= max_words);
        prop_assert!(!normalized.contains(". "));
        prop_assert!(!normalized.contains("! "));
        prop_assert!(!normalized.contains("? "));
    }

    #[test]
    fn accepted_summaries_are_already_normalized(raw in summary_text()) {
        let policy = SummaryPolicy { min_chars: 5, max_words: 20 };
        if let Some(accepted) = policy.accept(&raw) {
            prop_assert_eq!(policy.normalize(&accepted), accepted.clone());
            prop_assert!(accepted.chars().any(char::is_alphabetic));
        }
    }
}
