//! Text tokenization.
//!
//! Text is lowercased, then split into:
//! - single Han characters (CJK text has no word delimiters),
//! - maximal runs of other alphabetic characters,
//! - maximal runs of decimal digits.
//!
//! Everything else (whitespace, punctuation, symbols) separates tokens.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static TOKEN_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"\p{Han}|[\p{Alphabetic}&&\P{Han}]+|\p{Nd}+"));

/// Tokenize text into searchable terms.
///
/// ```
/// use recall_lexical::tokenize;
///
/// assert_eq!(tokenize("Revenue: $1M target!"), vec!["revenue", "1", "m", "target"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    match TOKEN_RE.as_ref() {
        Ok(re) => re.find_iter(&lower).map(|m| m.as_str().to_string()).collect(),
        Err(_) => lower.split_whitespace().map(str::to_string).collect(),
    }
}

/// Tokenize and deduplicate, keeping first-occurrence order.
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn test_tokenize_keeps_short_words() {
        assert_eq!(tokenize("I am a test"), vec!["i", "am", "a", "test"]);
    }

    #[test]
    fn test_tokenize_splits_letters_and_digits() {
        assert_eq!(tokenize("q3 2024"), vec!["q", "3", "2024"]);
    }

    #[test]
    fn test_tokenize_han_per_character() {
        assert_eq!(tokenize("车市场 分析"), vec!["车", "市", "场", "分", "析"]);
    }

    #[test]
    fn test_tokenize_mixed_scripts() {
        assert_eq!(tokenize("BM25检索"), vec!["bm", "25", "检", "索"]);
    }

    #[test]
    fn test_tokenize_accented() {
        assert_eq!(tokenize("Café Überblick"), vec!["café", "überblick"]);
    }

    #[test]
    fn test_tokenize_empty_and_punctuation() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("...---...").is_empty());
    }

    #[test]
    fn test_tokenize_unique() {
        assert_eq!(tokenize_unique("test Test TEST other"), vec!["test", "other"]);
    }
}
