use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid"));

/// Splits stored text into its set of lower-cased searchable terms.
pub fn tokenize_text(text: &str) -> HashSet<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|word| word.chars().count() > 1)
        .collect()
}

/// Splits a user query into terms, keeping their order.
pub fn tokenize_query(query: &str) -> Vec<String> {
    WORD.find_iter(&query.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|word| word.chars().count() > 1)
        .collect()
}
