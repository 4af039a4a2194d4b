//! The hybrid searcher: both engines, one ranking.
//!
//! A query fans out to the dense leg (query embedding, then inner-product
//! search) and the sparse leg (tokenization, then BM25). With `parallel`
//! enabled the legs run concurrently and join before fusion; fusion is a
//! pure function of the two result sets, so the final ordering is identical
//! either way.
//!
//! Leg failure policy: a query whose embedding is degenerate (empty input,
//! zero vector) simply yields an empty dense leg. A transport or index
//! fault, by contrast, is a leg error, surfaced to the fallback controller
//! rather than silently swallowed, so the engine can degrade deliberately.

use std::sync::Arc;
use std::time::Instant;

use dense::{DenseHit, DenseIndex};
use embed::{EmbedError, EmbedRole, Embedder};
use sparse::{Bm25Index, SparseHit};
use tracing::debug;

use crate::config::HybridConfig;
use crate::fusion::{fuse, FusedHit};
use crate::stats::{SearchStats, SearchStatsSnapshot};
use crate::EngineError;

pub struct HybridSearcher {
    config: HybridConfig,
    embedder: Arc<Embedder>,
    dense: Arc<DenseIndex>,
    sparse: Arc<Bm25Index>,
    stats: SearchStats,
}

impl HybridSearcher {
    pub fn new(
        config: HybridConfig,
        embedder: Arc<Embedder>,
        dense: Arc<DenseIndex>,
        sparse: Arc<Bm25Index>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            embedder,
            dense,
            sparse,
            stats: SearchStats::default(),
        })
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    pub fn dense_index(&self) -> &DenseIndex {
        &self.dense
    }

    pub fn sparse_index(&self) -> &Bm25Index {
        &self.sparse
    }

    pub fn stats(&self) -> SearchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Runs both legs and fuses their rankings into the top `k`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<FusedHit>, EngineError> {
        let start = Instant::now();

        let (vector_hits, keyword_hits) = if self.config.parallel {
            let (vector, keyword) = tokio::join!(
                self.dense_leg(query, self.config.vector_top_k),
                self.sparse_leg(query, self.config.keyword_top_k),
            );
            (vector?, keyword?)
        } else {
            let vector = self.dense_leg(query, self.config.vector_top_k).await?;
            let keyword = self.sparse_leg(query, self.config.keyword_top_k).await?;
            (vector, keyword)
        };

        debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            "search legs complete"
        );

        let fusion_start = Instant::now();
        let fused = fuse(query, &vector_hits, &keyword_hits, &self.config, k);
        self.stats.record(start.elapsed(), fusion_start.elapsed());
        Ok(fused)
    }

    /// Dense-only retrieval for the degraded path. Raw cosine scores stand
    /// in for combined scores.
    pub async fn search_dense_only(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<FusedHit>, EngineError> {
        let hits = self.dense_leg(query, k).await?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank0, hit)| FusedHit {
                doc_id: hit.doc_id,
                combined_score: hit.score,
                vector_score: Some(hit.score),
                vector_rank: Some(rank0 + 1),
                keyword_score: None,
                keyword_rank: None,
                matched_tokens: Vec::new(),
            })
            .collect())
    }

    /// Sparse-only retrieval for the degraded path. Raw BM25 scores stand
    /// in for combined scores.
    pub async fn search_sparse_only(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<FusedHit>, EngineError> {
        let hits = self.sparse_leg(query, k).await?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank0, hit)| FusedHit {
                doc_id: hit.doc_id,
                combined_score: hit.score,
                vector_score: None,
                vector_rank: None,
                keyword_score: Some(hit.score),
                keyword_rank: Some(rank0 + 1),
                matched_tokens: hit.matched_tokens,
            })
            .collect())
    }

    async fn dense_leg(&self, query: &str, k: usize) -> Result<Vec<DenseHit>, EngineError> {
        let embedding = match self.embedder.embed("query", query, EmbedRole::Query).await {
            Ok(embedding) => embedding,
            // A degenerate query has no direction in embedding space; that
            // is an empty result, not a failure.
            Err(EmbedError::ZeroVector) => return Ok(Vec::new()),
            Err(err) => return Err(EngineError::DenseLeg(err.to_string())),
        };

        let dense = Arc::clone(&self.dense);
        tokio::task::spawn_blocking(move || dense.search(&embedding.vector, k))
            .await
            .map_err(|e| EngineError::DenseLeg(format!("search task failed: {e}")))?
            .map_err(|e| EngineError::DenseLeg(e.to_string()))
    }

    async fn sparse_leg(&self, query: &str, k: usize) -> Result<Vec<SparseHit>, EngineError> {
        let sparse = Arc::clone(&self.sparse);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || sparse.search(&query, k))
            .await
            .map_err(|e| EngineError::SparseLeg(format!("search task failed: {e}")))
    }
}
