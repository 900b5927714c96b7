//! Scans a question and its surviving chunks for quoted or capitalized terms
//! that match an entry in the source's definitions map.

use crate::model::{Chunk, Definition};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static QUOTED_TERM: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"["“”'‘’]([^"“”'‘’]{1,80})["“”'‘’]"#).unwrap()
});

static CAPITALIZED_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b([A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*){0,3})\b").unwrap()
});

/// Links defined terms mentioned in the question or surviving chunks to
/// their entries in `definitions`, preserving first-occurrence order.
#[must_use]
pub fn link_definitions(
    question: &str,
    chunks: &[Chunk],
    definitions: &HashMap<String, Definition>,
) -> Vec<Definition> {
    let mut seen = std::collections::HashSet::new();
    let mut linked = Vec::new();

    let mut texts = vec![question];
    texts.extend(chunks.iter().map(|c| c.text.as_str()));

    for text in texts.drain(..) {
        for candidate in candidate_terms(text) {
            let key = candidate.trim().to_lowercase();
            if key.is_empty() || seen.contains(&key) {
                continue;
            }
            if let Some(def) = definitions.get(&key) {
                seen.insert(key);
                linked.push(def.clone());
            }
        }
    }

    linked
}

fn candidate_terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for cap in QUOTED_TERM.captures_iter(text) {
        terms.push(cap[1].to_string());
    }
    for cap in CAPITALIZED_PHRASE.captures_iter(text) {
        terms.push(cap[1].to_string());
    }
    terms
}
