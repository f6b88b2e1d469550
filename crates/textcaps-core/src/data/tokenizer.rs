//! # Word tokenizer
//!
//! Splits raw document text into lowercase word tokens. The same tokenizer is
//! applied to the train and test splits so that vocabulary lookups agree.

use regex::Regex;

use crate::error::Result;

/// Word pattern: alphanumeric runs, optionally joined by inner apostrophes.
const WORD_PATTERN: &str = r"[\p{L}\p{N}]+(?:'[\p{L}\p{N}]+)*";

/// Lowercasing regex tokenizer.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    word: Regex,
}

impl Tokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Result<Self> {
        Ok(Self {
            word: Regex::new(WORD_PATTERN)?,
        })
    }

    /// Tokenize a document into lowercase words.
    ///
    /// # Examples
    /// ```
    /// use textcaps_core::data::Tokenizer;
    ///
    /// let tokenizer = Tokenizer::new().unwrap();
    /// let tokens = tokenizer.tokenize("It's a <b>GREAT</b> movie!");
    /// assert_eq!(tokens, vec!["it's", "a", "b", "great", "b", "movie"]);
    /// ```
    pub fn tokenize(&self, input: &str) -> Vec<String> {
        let lower = input.to_lowercase();
        self.word
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Tokenize and keep at most `max_len` tokens.
    pub fn tokenize_truncated(&self, input: &str, max_len: usize) -> Vec<String> {
        let lower = input.to_lowercase();
        self.word
            .find_iter(&lower)
            .take(max_len)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let tokenizer = Tokenizer::new().unwrap();
        let tokens = tokenizer.tokenize("The quick, brown FOX -- jumped.");
        assert_eq!(tokens, vec!["the", "quick", "brown", "fox", "jumped"]);
    }

    #[test]
    fn test_tokenize_keeps_inner_apostrophes() {
        let tokenizer = Tokenizer::new().unwrap();
        let tokens = tokenizer.tokenize("don't 'quote' rock'n'roll");
        assert_eq!(tokens, vec!["don't", "quote", "rock'n'roll"]);
    }

    #[test]
    fn test_tokenize_unicode() {
        let tokenizer = Tokenizer::new().unwrap();
        let tokens = tokenizer.tokenize("Café São-Paulo 2024");
        assert_eq!(tokens, vec!["café", "são", "paulo", "2024"]);
    }

    #[test]
    fn test_tokenize_empty() {
        let tokenizer = Tokenizer::new().unwrap();
        assert!(tokenizer.tokenize("").is_empty());
        assert!(tokenizer.tokenize("... --- !!!").is_empty());
    }

    #[test]
    fn test_tokenize_truncated() {
        let tokenizer = Tokenizer::new().unwrap();
        let tokens = tokenizer.tokenize_truncated("one two three four", 2);
        assert_eq!(tokens, vec!["one", "two"]);
    }
}
