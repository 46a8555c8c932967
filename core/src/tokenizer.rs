use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref NON_LETTER: Regex = Regex::new("[^A-Za-z]+").expect("valid regex");
}

/// Tokenize text into lowercased ASCII letter-runs, in order of appearance.
/// Anything that is not `[A-Za-z]` separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    NON_LETTER
        .split(text)
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect()
}

/// The distinct word set of a document body, as folded into the inverted
/// index. Each document contributes each token at most once.
pub fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_non_letters() {
        let toks = tokenize("Hello, world! 42 foo_bar");
        assert_eq!(toks, vec!["hello", "world", "foo", "bar"]);
    }

    #[test]
    fn empty_and_symbol_only_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("123 -- !!").is_empty());
    }

    #[test]
    fn word_set_is_distinct() {
        let words = word_set("the cat and the hat");
        assert_eq!(words.len(), 4);
        assert!(words.contains("the"));
        assert!(words.contains("hat"));
    }
}
