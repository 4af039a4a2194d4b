//! BM25 keyword index.
//!
//! Scores documents against a query with Okapi BM25 over the shared token
//! stream (title and content joined by a single space, tokenized by
//! [`textproc`]). The model is fit once over the whole corpus and frozen;
//! documents whose token stream comes out empty are excluded.
//!
//! Scoring, for every query token `t` (duplicates included):
//!
//! ```text
//! score(q, d) = Σ IDF(t) · f(t,d) · (k1 + 1) / (f(t,d) + k1 · (1 − b + b · |d| / avgdl))
//! IDF(t)      = ln((N − n(t) + 0.5) / (n(t) + 0.5) + 1)
//! ```
//!
//! Only strictly positive scores are reported, best first, with ties in
//! insertion order. Each hit carries the query tokens found in the document
//! for diagnostic output.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use corpus::Document;
use serde::{Deserialize, Serialize};
use textproc::{Tokenizer, TokenizerConfig};
use thiserror::Error;
use tracing::{debug, info};

/// Bump when the snapshot layout changes.
pub const SPARSE_SCHEMA_VERSION: u16 = 1;

/// BM25 free parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation. Must be positive.
    pub k1: f32,
    /// Length normalization in `[0, 1]`.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Params {
    pub fn validate(&self) -> Result<(), SparseIndexError> {
        if !(self.k1 > 0.0) {
            return Err(SparseIndexError::InvalidParams(
                "k1 must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(SparseIndexError::InvalidParams(
                "b must be between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// A keyword hit, best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseHit {
    pub doc_id: String,
    /// Strictly positive BM25 score.
    pub score: f32,
    /// Query tokens present in the document, in query order.
    pub matched_tokens: Vec<String>,
}

/// Summary diagnostics over a fitted index.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Bm25Stats {
    pub documents: usize,
    pub vocabulary_size: usize,
    pub avg_document_length: f64,
    pub params: Bm25Params,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SparseIndexError {
    #[error("invalid bm25 params: {0}")]
    InvalidParams(String),
    #[error("snapshot encode error: {0}")]
    Encode(String),
    #[error("snapshot decode error: {0}")]
    Decode(String),
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bincode::error::EncodeError> for SparseIndexError {
    fn from(e: bincode::error::EncodeError) -> Self {
        SparseIndexError::Encode(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for SparseIndexError {
    fn from(e: bincode::error::DecodeError) -> Self {
        SparseIndexError::Decode(e.to_string())
    }
}

/// The fitted BM25 model plus its aligned document copies.
///
/// The tokenizer is rebuilt lazily from the recorded config after
/// deserialization, so a loaded snapshot tokenizes queries exactly as the
/// fit did.
#[derive(Serialize, Deserialize)]
pub struct Bm25Index {
    schema_version: u16,
    params: Bm25Params,
    tokenizer_config: TokenizerConfig,
    documents: Vec<Document>,
    /// Per-document term frequencies, aligned with `documents`.
    term_freqs: Vec<HashMap<String, u32>>,
    /// Per-document token counts, aligned with `documents`.
    doc_lengths: Vec<u32>,
    avgdl: f64,
    /// Number of documents containing each term at least once.
    doc_freq: HashMap<String, u32>,
    #[serde(skip)]
    tokenizer: OnceLock<Tokenizer>,
}

impl std::fmt::Debug for Bm25Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bm25Index")
            .field("schema_version", &self.schema_version)
            .field("params", &self.params)
            .field("tokenizer_config", &self.tokenizer_config)
            .field("documents", &self.documents)
            .field("term_freqs", &self.term_freqs)
            .field("doc_lengths", &self.doc_lengths)
            .field("avgdl", &self.avgdl)
            .field("doc_freq", &self.doc_freq)
            .finish()
    }
}

impl Bm25Index {
    /// Fits the model over `documents`. Token-empty documents are excluded
    /// with a debug note; everything else is frozen into the index.
    pub fn fit(
        documents: Vec<Document>,
        params: Bm25Params,
        tokenizer_config: TokenizerConfig,
    ) -> Result<Self, SparseIndexError> {
        params.validate()?;
        let tokenizer = Tokenizer::new(tokenizer_config);

        let mut kept_docs = Vec::new();
        let mut term_freqs = Vec::new();
        let mut doc_lengths = Vec::new();
        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0u64;

        for document in documents {
            let tokens = tokenizer.tokenize(&document.full_text());
            if tokens.is_empty() {
                debug!(doc_id = %document.id, "document has no tokens, excluded from bm25");
                continue;
            }

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_default() += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }

            total_len += tokens.len() as u64;
            doc_lengths.push(tokens.len() as u32);
            term_freqs.push(freqs);
            kept_docs.push(document);
        }

        let avgdl = if kept_docs.is_empty() {
            0.0
        } else {
            total_len as f64 / kept_docs.len() as f64
        };

        info!(
            documents = kept_docs.len(),
            vocabulary = doc_freq.len(),
            avgdl,
            "fitted bm25 index"
        );

        let index = Self {
            schema_version: SPARSE_SCHEMA_VERSION,
            params,
            tokenizer_config,
            documents: kept_docs,
            term_freqs,
            doc_lengths,
            avgdl,
            doc_freq,
            tokenizer: OnceLock::new(),
        };
        let _ = index.tokenizer.set(tokenizer);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Documents retained by the fit, in insertion order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn stats(&self) -> Bm25Stats {
        Bm25Stats {
            documents: self.documents.len(),
            vocabulary_size: self.doc_freq.len(),
            avg_document_length: self.avgdl,
            params: self.params,
        }
    }

    fn tokenizer(&self) -> &Tokenizer {
        self.tokenizer
            .get_or_init(|| Tokenizer::new(self.tokenizer_config))
    }

    /// Tokenizes `query` with the fit-time configuration.
    pub fn query_tokens(&self, query: &str) -> Vec<String> {
        self.tokenizer().tokenize(query)
    }

    /// Up to `k` documents with strictly positive BM25 score, best first.
    /// An empty token stream after preprocessing yields an empty result.
    pub fn search(&self, query: &str, k: usize) -> Vec<SparseHit> {
        let query_tokens = self.query_tokens(query);
        if query_tokens.is_empty() || self.documents.is_empty() || k == 0 {
            return Vec::new();
        }

        let n = self.documents.len() as f64;
        let k1 = self.params.k1 as f64;
        let b = self.params.b as f64;

        let mut scored: Vec<(usize, f64)> = Vec::new();
        for (position, freqs) in self.term_freqs.iter().enumerate() {
            let doc_len = self.doc_lengths[position] as f64;
            let norm = k1 * (1.0 - b + b * doc_len / self.avgdl);

            let mut score = 0.0f64;
            for token in &query_tokens {
                let tf = freqs.get(token).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let df = self.doc_freq.get(token).copied().unwrap_or(0) as f64;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                score += idf * (tf * (k1 + 1.0)) / (tf + norm);
            }

            if score > 0.0 {
                scored.push((position, score));
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(position, score)| {
                let freqs = &self.term_freqs[position];
                let matched: Vec<String> = query_tokens
                    .iter()
                    .filter(|t| freqs.contains_key(t.as_str()))
                    .cloned()
                    .collect();
                SparseHit {
                    doc_id: self.documents[position].id.clone(),
                    score: score as f32,
                    matched_tokens: matched,
                }
            })
            .collect()
    }

    /// Persists the fitted model as one blob (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), SparseIndexError> {
        let raw = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        let compressed = zstd::encode_all(raw.as_slice(), 3)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &compressed)?;
        fs::rename(&tmp, path)?;
        info!(documents = self.documents.len(), path = %path.display(), "saved bm25 index");
        Ok(())
    }

    /// Restores a fitted model from its blob.
    pub fn load(path: &Path) -> Result<Self, SparseIndexError> {
        let compressed = fs::read(path)?;
        let raw = zstd::decode_all(compressed.as_slice())?;
        let (index, _): (Self, usize) =
            bincode::serde::decode_from_slice(&raw, bincode::config::standard())?;
        index.params.validate()?;
        Ok(index)
    }
}
