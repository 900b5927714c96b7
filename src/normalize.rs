//! Query normalization: a deterministic string transform producing a
//! keyword-oriented query from a natural-language question.

/// Ordered list of question-style prefixes stripped before filler removal.
/// Order matters: the first matching (and therefore longest, since these are
/// listed longest-first within overlapping families) prefix wins.
const QUESTION_PREFIXES: &[&str] = &[
    "what is",
    "what are",
    "what's",
    "can you",
    "could you",
    "would you",
    "please explain",
    "please tell me",
    "how does",
    "how do",
    "how is",
    "tell me about",
    "explain",
];

/// Closed set of filler words dropped during tokenization (§6.3).
const FILLER_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "this", "that", "these", "those", "i", "me", "my", "we", "our", "you", "your",
];

/// Normalizes a natural-language question into a keyword-oriented query.
///
/// Pure and idempotent: `normalize(normalize(q)) == normalize(q)` for all
/// `q`. Never returns an empty string for non-empty input: if every token is
/// a filler word, the lowercased trimmed original question is returned
/// unchanged (the no-op fallback).
#[must_use]
pub fn normalize(question: &str) -> String {
    let lowered = question.trim().to_lowercase();
    let fallback = lowered.clone();

    let without_punct = strip_trailing_punctuation(&lowered);
    let without_prefix = strip_question_prefix(without_punct);

    let kept: Vec<&str> = without_prefix
        .split_whitespace()
        .filter(|tok| !FILLER_WORDS.contains(tok))
        .collect();

    if kept.is_empty() {
        fallback
    } else {
        kept.join(" ")
    }
}

fn strip_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(['?', '.'])
}

fn strip_question_prefix(s: &str) -> &str {
    let trimmed = s.trim();
    for prefix in QUESTION_PREFIXES {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("What is a subscriber?", "subscriber"; "strips prefix and question mark")]
    #[test_case("  What is   the license   ", "license"; "collapses whitespace and drops filler")]
    #[test_case("Tell me about termination clauses", "termination clauses"; "strips tell me about")]
    #[test_case("Please explain the governing law.", "governing law"; "strips please explain")]
    #[test_case("Is this transferable?", "transferable"; "strips leading filler after punctuation removal")]
    fn normalizes_as_expected(input: &str, expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn falls_back_to_lowercased_trim_when_all_filler() {
        assert_eq!(normalize("Is This That"), "is this that");
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "What is a subscriber?",
            "how does termination work",
            "Is This That",
            "   ",
            "Explain the warranty disclaimer",
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn never_empty_for_nonempty_non_whitespace_input() {
        assert!(!normalize("the a an").is_empty());
        assert!(!normalize("subscriber").is_empty());
    }

    #[test]
    fn preserves_internal_punctuation() {
        assert_eq!(normalize("What is a 'material breach'?"), "'material breach'");
    }
}
