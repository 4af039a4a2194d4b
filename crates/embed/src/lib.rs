//! Embedding client for the retrieval engine.
//!
//! Wraps the external embedding model behind one contract: `text` in, unit
//! vector of the engine-wide dimension `D` out. The client truncates input
//! to a safe length, validates the backend's vector (dimension, finiteness),
//! L2-normalizes it, and rejects zero vectors so downstream code never
//! stores a degenerate direction.
//!
//! Two backends:
//!
//! - **api**: a remote model over HTTPS (dimension 768), retried once on
//!   transient failure.
//! - **hash**: deterministic bag-of-token vectors (dimension 384). No
//!   network, reproducible everywhere; used offline and by the test suites.
//!
//! ## Example
//!
//! ```
//! use embed::{Embedder, EmbedConfig, EmbedRole};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let embedder = Embedder::new(EmbedConfig::hash(64)).unwrap();
//! let e = embedder.embed("doc-1", "tekanan darah tinggi", EmbedRole::Document)
//!     .await
//!     .unwrap();
//! assert_eq!(e.vector.len(), 64);
//! # }
//! ```

mod api;
mod config;
mod error;
mod hash;
mod normalize;
mod retry;
mod types;

pub use crate::config::{EmbedConfig, EmbedMode};
pub use crate::error::EmbedError;
pub use crate::retry::RetryConfig;
pub use crate::types::{EmbedRole, Embedding};

use crate::normalize::{l2_normalize_in_place, validate_vector};

/// The embedding client. Cheap to clone-by-reference; holds no connection
/// state of its own (the HTTP pool is process-wide).
pub struct Embedder {
    config: EmbedConfig,
}

impl Embedder {
    pub fn new(config: EmbedConfig) -> Result<Self, EmbedError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The engine-wide vector dimension `D`, fixed at construction.
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Embeds one text, returning a validated unit vector.
    pub async fn embed(
        &self,
        doc_id: &str,
        text: &str,
        role: EmbedRole,
    ) -> Result<Embedding, EmbedError> {
        let text = truncate_chars(text, self.config.max_chars);
        let vector = match self.config.mode {
            EmbedMode::Hash => hash::hash_embedding(text, self.config.dimension),
            EmbedMode::Api => api::embed_via_api(text, role, &self.config).await?,
        };
        self.finish(doc_id, vector)
    }

    /// Embeds a batch of `(doc_id, text)` pairs in one backend round-trip.
    ///
    /// The whole batch fails together on a backend error; callers that need
    /// per-record drop semantics fall back to [`embed`](Self::embed) for the
    /// failing chunk.
    pub async fn embed_batch(
        &self,
        docs: &[(String, String)],
        role: EmbedRole,
    ) -> Result<Vec<Result<Embedding, EmbedError>>, EmbedError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let truncated: Vec<&str> = docs
            .iter()
            .map(|(_, text)| truncate_chars(text, self.config.max_chars))
            .collect();

        let vectors = match self.config.mode {
            EmbedMode::Hash => truncated
                .iter()
                .map(|text| hash::hash_embedding(text, self.config.dimension))
                .collect(),
            EmbedMode::Api => api::embed_batch_via_api(&truncated, role, &self.config).await?,
        };

        Ok(docs
            .iter()
            .zip(vectors)
            .map(|((doc_id, _), vector)| self.finish(doc_id, vector))
            .collect())
    }

    /// Validates and normalizes a backend vector into an [`Embedding`].
    fn finish(&self, doc_id: &str, mut vector: Vec<f32>) -> Result<Embedding, EmbedError> {
        validate_vector(&vector, self.config.dimension)?;
        l2_normalize_in_place(&mut vector);
        Ok(Embedding {
            doc_id: doc_id.to_string(),
            dimension: vector.len(),
            vector,
            model_name: self.config.model_name.clone(),
        })
    }
}

/// Truncates to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
