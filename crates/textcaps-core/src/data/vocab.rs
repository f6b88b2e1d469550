//! Word vocabulary built from the training split.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Padding token id. Batches are filled with this value.
pub const PAD_ID: u32 = 0;
/// Out-of-vocabulary token id.
pub const UNK_ID: u32 = 1;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";

/// Limits applied when building a vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabOptions {
    /// Tokens seen fewer times than this are dropped.
    pub min_freq: usize,
    /// Maximum table size including the two reserved tokens.
    pub max_size: Option<usize>,
}

impl Default for VocabOptions {
    fn default() -> Self {
        Self {
            min_freq: 1,
            max_size: None,
        }
    }
}

/// Dictionary mapping words to contiguous ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocab {
    itos: Vec<String>,
    stoi: HashMap<String, u32>,
}

impl Vocab {
    /// Build a vocabulary from tokenized documents.
    ///
    /// Ids 0 and 1 are reserved for `<pad>` and `<unk>`; the rest are assigned
    /// by descending frequency, ties broken lexically.
    pub fn build<'a, I, D>(documents: I, options: VocabOptions) -> Self
    where
        I: IntoIterator<Item = D>,
        D: IntoIterator<Item = &'a String>,
    {
        let mut counts: HashMap<&'a str, usize> = HashMap::new();
        for doc in documents {
            for token in doc {
                *counts.entry(token.as_str()).or_default() += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = counts
            .into_iter()
            .filter(|(token, count)| {
                *count >= options.min_freq && *token != PAD_TOKEN && *token != UNK_TOKEN
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut itos = vec![PAD_TOKEN.to_string(), UNK_TOKEN.to_string()];
        let budget = options
            .max_size
            .map(|max| max.saturating_sub(itos.len()))
            .unwrap_or(usize::MAX);
        itos.extend(ranked.into_iter().take(budget).map(|(t, _)| t.to_string()));

        Self::from(itos)
    }

    /// Look up a token, falling back to `<unk>`.
    pub fn id(&self, token: &str) -> u32 {
        self.stoi.get(token).copied().unwrap_or(UNK_ID)
    }

    /// Encode a token sequence.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        tokens.iter().map(|t| self.id(t.as_ref())).collect()
    }

    /// Token for an id, if in range.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.itos.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    /// Tokens in id order.
    pub fn tokens(&self) -> &[String] {
        &self.itos
    }
}

impl From<Vec<String>> for Vocab {
    fn from(itos: Vec<String>) -> Self {
        let stoi = itos
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Self { itos, stoi }
    }
}

impl From<Vocab> for Vec<String> {
    fn from(vocab: Vocab) -> Self {
        vocab.itos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts
            .iter()
            .map(|t| t.split_whitespace().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_reserved_ids() {
        let vocab = Vocab::build(&docs(&["a b"]), VocabOptions::default());
        assert_eq!(vocab.token(PAD_ID), Some(PAD_TOKEN));
        assert_eq!(vocab.token(UNK_ID), Some(UNK_TOKEN));
        assert_eq!(vocab.id("never-seen"), UNK_ID);
    }

    #[test]
    fn test_frequency_order_with_lexical_ties() {
        let vocab = Vocab::build(&docs(&["b a c a", "c a d"]), VocabOptions::default());
        // a=3, c=2, b=1, d=1
        assert_eq!(&vocab.tokens()[2..], &["a", "c", "b", "d"]);
        assert_eq!(vocab.encode(&["a", "zzz", "d"]), vec![2, UNK_ID, 5]);
    }

    #[test]
    fn test_min_freq_and_max_size() {
        let data = docs(&["x x x y y z"]);
        let vocab = Vocab::build(
            &data,
            VocabOptions {
                min_freq: 2,
                max_size: None,
            },
        );
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.id("z"), UNK_ID);

        let vocab = Vocab::build(
            &data,
            VocabOptions {
                min_freq: 1,
                max_size: Some(3),
            },
        );
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.id("x"), 2);
        assert_eq!(vocab.id("y"), UNK_ID);
    }

    #[test]
    fn test_serde_as_token_list() {
        let vocab = Vocab::build(&docs(&["hello world hello"]), VocabOptions::default());
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"["<pad>","<unk>","hello","world"]"#);
        let back: Vocab = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id("world"), 3);
    }
}
