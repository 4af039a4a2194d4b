//! Text normalization and tokenization for the retrieval pipeline.
//!
//! Both indexes consume the same deterministic token stream: lowercase the
//! input, fold everything outside `[a-z0-9]` to spaces, split on whitespace,
//! drop short tokens and stop words, then stem. Identical input and
//! configuration always produce identical output, on any machine; the
//! sparse index snapshot depends on it.
//!
//! ## Example
//!
//! ```
//! use textproc::{Tokenizer, TokenizerConfig};
//!
//! let tokenizer = Tokenizer::new(TokenizerConfig::default());
//! let tokens = tokenizer.tokenize("Hipertensi: tekanan darah tinggi!");
//! assert_eq!(tokens, vec!["hipertensi", "tekanan", "darah", "tinggi"]);
//! ```

use std::collections::HashSet;

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};

mod stopwords;

/// Language selector for the stop-word set.
///
/// The corpus mixes Indonesian and English material, so the Indonesian
/// setting applies the English list as a supplement. Stemming always uses
/// the Porter (English) algorithm; Snowball has no Indonesian stemmer and
/// the two-language corpus is stemmed consistently either way because the
/// query passes through the same pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Indonesian,
    English,
}

/// Configuration for [`Tokenizer`].
///
/// Serde-able so the sparse index snapshot can record the exact settings it
/// was fit with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenizerConfig {
    /// Selects the stop-word set. Default [`Language::Indonesian`].
    pub language: Language,
    /// Apply the Porter stemmer to surviving tokens. Default true.
    pub use_stemming: bool,
    /// Drop stop words (exact match, pre-stem). Default true.
    pub remove_stopwords: bool,
    /// Minimum token length in bytes; shorter tokens are dropped. Default 2.
    pub min_word_length: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            language: Language::Indonesian,
            use_stemming: true,
            remove_stopwords: true,
            min_word_length: 2,
        }
    }
}

impl TokenizerConfig {
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_stemming(mut self, use_stemming: bool) -> Self {
        self.use_stemming = use_stemming;
        self
    }

    pub fn with_stopwords(mut self, remove_stopwords: bool) -> Self {
        self.remove_stopwords = remove_stopwords;
        self
    }

    pub fn with_min_word_length(mut self, min_word_length: usize) -> Self {
        self.min_word_length = min_word_length.max(1);
        self
    }
}

/// Deterministic tokenizer over a fixed configuration.
///
/// Construction resolves the stop-word set and stemmer once; `tokenize` is
/// then allocation-light and side-effect free.
pub struct Tokenizer {
    config: TokenizerConfig,
    stop_set: HashSet<&'static str>,
    stemmer: Option<Stemmer>,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let stop_set = if config.remove_stopwords {
            match config.language {
                Language::Indonesian => stopwords::ENGLISH
                    .iter()
                    .chain(stopwords::INDONESIAN.iter())
                    .copied()
                    .collect(),
                Language::English => stopwords::ENGLISH.iter().copied().collect(),
            }
        } else {
            HashSet::new()
        };

        let stemmer = config
            .use_stemming
            .then(|| Stemmer::create(Algorithm::English));

        Self {
            config,
            stop_set,
            stemmer,
        }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Tokenizes `text` into the processed term stream.
    ///
    /// Pipeline: lowercase, fold non-`[a-z0-9]` characters to spaces, split
    /// on whitespace, drop tokens shorter than `min_word_length`, drop stop
    /// words, stem. Order and duplicates are preserved.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let lowered = text.to_lowercase();
        let cleaned: String = lowered
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c.is_whitespace() {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let mut tokens = Vec::new();
        for raw in cleaned.split_whitespace() {
            if raw.len() < self.config.min_word_length {
                continue;
            }
            if self.config.remove_stopwords && self.stop_set.contains(raw) {
                continue;
            }
            let token = match &self.stemmer {
                Some(stemmer) => stemmer.stem(raw).into_owned(),
                None => raw.to_string(),
            };
            tokens.push(token);
        }

        tokens
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

/// Returns the query tokens that occur in the document token stream,
/// preserving query order. Used for per-hit match diagnostics.
pub fn token_overlap(query_tokens: &[String], doc_tokens: &[String]) -> Vec<String> {
    let doc_set: HashSet<&str> = doc_tokens.iter().map(String::as_str).collect();
    query_tokens
        .iter()
        .filter(|t| doc_set.contains(t.as_str()))
        .cloned()
        .collect()
}
