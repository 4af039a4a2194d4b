//! The retrieval facade.
//!
//! [`RagEngine`] is the single public entry point: construct with
//! [`load_or_build`](RagEngine::load_or_build) (which restores a fresh
//! snapshot or ingests, embeds, and builds both indexes), then call
//! [`query`](RagEngine::query). The facade orchestrates the hybrid
//! searcher and the generator, enforces the per-query deadline, and routes
//! failures through the fallback controller so the caller always receives a
//! well-formed [`QueryResult`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use corpus::Document;
use dense::{DenseIndex, IndexKind};
use embed::{EmbedRole, Embedder};
use serde::Serialize;
use sparse::Bm25Index;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{self, CacheManifest, IndexPaths};
use crate::fallback::{EngineState, StateCell};
use crate::fusion::FusedHit;
use crate::generator::{self, ContextPassage, Generator, APOLOGY};
use crate::hybrid::HybridSearcher;
use crate::{EngineConfig, EngineError};

/// Characters of content carried into each result preview.
const PREVIEW_CHARS: usize = 200;

/// One ranked passage in the response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievedDocument {
    pub title: String,
    pub source: String,
    pub content_preview: String,
    pub score: f32,
    pub retrieval_method: String,
    pub reference: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PerformanceMetadata {
    pub search_time_seconds: f64,
    pub generation_time_seconds: f64,
    pub total_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryMetadata {
    pub num_retrieved_docs: usize,
    /// Unique source tags among the retrieved passages, in rank order.
    pub data_sources: Vec<String>,
    pub total_documents_available: usize,
    pub top_score: f32,
    /// `hybrid`, `dense_fallback`, or `sparse_fallback`.
    pub engine: String,
    pub error: bool,
    pub performance: PerformanceMetadata,
}

/// The complete response object. Always well-formed, error or not.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub query: String,
    pub response: String,
    pub retrieved_documents: Vec<RetrievedDocument>,
    pub metadata: QueryMetadata,
}

/// Build/load summary for operational output.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EngineStats {
    pub total_documents: usize,
    pub dense_vectors: usize,
    pub sparse_documents: usize,
    pub dimension: usize,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_time_seconds: Option<f64>,
    pub state: String,
}

pub struct RagEngine {
    config: EngineConfig,
    searcher: HybridSearcher,
    /// Union of both indexes' document copies, keyed by id.
    documents: HashMap<String, Document>,
    total_documents: usize,
    state: StateCell,
    generator: Arc<dyn Generator>,
    cache_hit: bool,
    build_time: Option<f64>,
}

impl RagEngine {
    /// Restores the snapshot when it is fresh, otherwise ingests the corpus
    /// and builds both indexes (embedding documents in the build phase, not
    /// on the query path), snapshotting the result.
    pub async fn load_or_build(
        config: EngineConfig,
        generator: Arc<dyn Generator>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let embedder = Arc::new(Embedder::new(config.embed.clone())?);
        let paths = IndexPaths::new(&config.data_dir);

        let mut loaded = None;
        if cache::is_cache_valid(&config.data_dir) {
            match load_snapshot(&paths) {
                Ok((dense_index, sparse_index))
                    if dense_index.dimension() == embedder.dimension() =>
                {
                    info!(
                        dense = dense_index.len(),
                        sparse = sparse_index.len(),
                        "loaded cached indexes"
                    );
                    loaded = Some((dense_index, sparse_index));
                }
                Ok((dense_index, _)) => {
                    warn!(
                        snapshot_dim = dense_index.dimension(),
                        embedder_dim = embedder.dimension(),
                        "snapshot dimension mismatch, rebuilding"
                    );
                }
                Err(err) => {
                    warn!(error = %err, "snapshot load failed, rebuilding");
                }
            }
        }

        let (dense_index, sparse_index, cache_hit, build_time) = match loaded {
            Some((dense_index, sparse_index)) => (dense_index, sparse_index, true, None),
            None => {
                let (dense_index, sparse_index, elapsed) =
                    build_indexes(&config, &embedder).await?;
                (dense_index, sparse_index, false, Some(elapsed))
            }
        };

        let mut documents = HashMap::new();
        for document in sparse_index
            .documents()
            .iter()
            .chain(dense_index.documents().iter())
        {
            documents
                .entry(document.id.clone())
                .or_insert_with(|| document.clone());
        }
        let total_documents = documents.len();

        let searcher = HybridSearcher::new(
            config.hybrid,
            embedder,
            Arc::new(dense_index),
            Arc::new(sparse_index),
        )?;

        Ok(Self {
            config,
            searcher,
            documents,
            total_documents,
            state: StateCell::new(),
            generator,
            cache_hit,
            build_time,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total_documents: self.total_documents,
            dense_vectors: self.searcher.dense_index().len(),
            sparse_documents: self.searcher.sparse_index().len(),
            dimension: self.searcher.dense_index().dimension(),
            cache_hit: self.cache_hit,
            build_time_seconds: self.build_time,
            state: self.state.load().label().to_string(),
        }
    }

    /// One retrieval + generation round trip.
    ///
    /// `top_k` defaults to the configured `final_top_k`; `prompt_tag`
    /// selects the system prompt (`general` when absent or unknown).
    pub async fn query(
        &self,
        text: &str,
        top_k: Option<usize>,
        prompt_tag: Option<&str>,
    ) -> QueryResult {
        let total_start = Instant::now();
        let k = top_k.unwrap_or(self.config.hybrid.final_top_k);
        let system_prompt = generator::system_prompt_for_tag(prompt_tag.unwrap_or("general"));
        let deadline = Duration::from_secs(self.config.timeout_secs);

        let search_start = Instant::now();
        let outcome = self.retrieve(text, k, deadline).await;
        let search_time = search_start.elapsed().as_secs_f64();

        let (hits, engine_label) = match outcome {
            Ok(pair) => pair,
            Err(err) => {
                return self.error_result(text, err, search_time, total_start);
            }
        };

        let passages: Vec<ContextPassage> = hits
            .iter()
            .filter_map(|hit| self.documents.get(&hit.doc_id))
            .map(|document| ContextPassage {
                source_tag: document.source_tag.clone(),
                title: document.title.clone(),
                content: document.content.clone(),
                reference: document.reference(),
            })
            .collect();

        let generation_start = Instant::now();
        let response = match self
            .generator
            .generate(system_prompt, text, &passages)
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                // Generator failure never fails the retrieval result.
                warn!(error = %err, "generator failed, returning apology");
                APOLOGY.to_string()
            }
        };
        let generation_time = generation_start.elapsed().as_secs_f64();

        let retrieved_documents: Vec<RetrievedDocument> = hits
            .iter()
            .filter_map(|hit| {
                self.documents
                    .get(&hit.doc_id)
                    .map(|document| to_retrieved(hit, document))
            })
            .collect();
        let data_sources = unique_sources(&retrieved_documents);
        let top_score = retrieved_documents.first().map_or(0.0, |d| d.score);

        debug!(
            hits = retrieved_documents.len(),
            engine = engine_label,
            "query complete"
        );

        QueryResult {
            error: None,
            query: text.to_string(),
            response,
            metadata: QueryMetadata {
                num_retrieved_docs: retrieved_documents.len(),
                data_sources,
                total_documents_available: self.total_documents,
                top_score,
                engine: engine_label.to_string(),
                error: false,
                performance: PerformanceMetadata {
                    search_time_seconds: search_time,
                    generation_time_seconds: generation_time,
                    total_time_seconds: total_start.elapsed().as_secs_f64(),
                },
            },
            retrieved_documents,
        }
    }

    /// Runs retrieval under the current engine state, degrading forward on
    /// timeout or failure. No partial results ever escape a timed-out path.
    async fn retrieve(
        &self,
        text: &str,
        k: usize,
        deadline: Duration,
    ) -> Result<(Vec<FusedHit>, &'static str), EngineError> {
        match self.state.load() {
            EngineState::ErrorOnly => Err(EngineError::ErrorOnly),
            state @ (EngineState::DegradedDense | EngineState::DegradedSparse) => {
                self.run_degraded(text, k, deadline, state).await
            }
            EngineState::Hybrid => match timeout(deadline, self.searcher.search(text, k)).await {
                Ok(Ok(hits)) => Ok((hits, EngineState::Hybrid.label())),
                Ok(Err(err)) => {
                    let target = degrade_target(&err);
                    warn!(error = %err, to = target.label(), "hybrid path failed, degrading");
                    let state = self.state.degrade(target);
                    self.run_degraded(text, k, deadline, state).await
                }
                Err(_) => {
                    warn!(
                        timeout_secs = deadline.as_secs(),
                        "hybrid path exceeded deadline, degrading to dense-only"
                    );
                    let state = self.state.degrade(EngineState::DegradedDense);
                    self.run_degraded(text, k, deadline, state).await
                }
            },
        }
    }

    async fn run_degraded(
        &self,
        text: &str,
        k: usize,
        deadline: Duration,
        state: EngineState,
    ) -> Result<(Vec<FusedHit>, &'static str), EngineError> {
        let attempt = match state {
            EngineState::DegradedDense => {
                timeout(deadline, self.searcher.search_dense_only(text, k)).await
            }
            EngineState::DegradedSparse => {
                timeout(deadline, self.searcher.search_sparse_only(text, k)).await
            }
            _ => return Err(EngineError::ErrorOnly),
        };

        match attempt {
            Ok(Ok(hits)) => Ok((hits, state.label())),
            Ok(Err(err)) => {
                warn!(error = %err, "degraded retrieval failed, entering error-only state");
                self.state.degrade(EngineState::ErrorOnly);
                Err(err)
            }
            Err(_) => {
                warn!("degraded retrieval exceeded deadline, entering error-only state");
                self.state.degrade(EngineState::ErrorOnly);
                Err(EngineError::Timeout(deadline))
            }
        }
    }

    fn error_result(
        &self,
        query: &str,
        err: EngineError,
        search_time: f64,
        total_start: Instant,
    ) -> QueryResult {
        QueryResult {
            error: Some(err.to_string()),
            query: query.to_string(),
            response: APOLOGY.to_string(),
            retrieved_documents: Vec::new(),
            metadata: QueryMetadata {
                num_retrieved_docs: 0,
                data_sources: Vec::new(),
                total_documents_available: self.total_documents,
                top_score: 0.0,
                engine: self.state.load().label().to_string(),
                error: true,
                performance: PerformanceMetadata {
                    search_time_seconds: search_time,
                    generation_time_seconds: 0.0,
                    total_time_seconds: total_start.elapsed().as_secs_f64(),
                },
            },
        }
    }
}

/// Which way to degrade: a dense-leg fault leaves the sparse leg usable and
/// vice versa; a timeout falls back to dense-only retrieval.
fn degrade_target(err: &EngineError) -> EngineState {
    match err {
        EngineError::DenseLeg(_) => EngineState::DegradedSparse,
        _ => EngineState::DegradedDense,
    }
}

fn load_snapshot(paths: &IndexPaths) -> Result<(DenseIndex, Bm25Index), EngineError> {
    let dense_index = DenseIndex::load(&paths.dense_vectors(), &paths.dense_metadata())?;
    let sparse_index = Bm25Index::load(&paths.sparse())?;
    Ok((dense_index, sparse_index))
}

/// Ingests the corpus, embeds what needs embedding, and fits both indexes.
/// Snapshot save failures are warnings; the engine continues in memory.
async fn build_indexes(
    config: &EngineConfig,
    embedder: &Embedder,
) -> Result<(DenseIndex, Bm25Index, f64), EngineError> {
    let build_start = Instant::now();
    let load = corpus::load_corpus(&config.data_dir, Some(embedder.dimension()))?;
    let documents = load.documents;
    info!(
        documents = documents.len(),
        dropped = load.dropped_records,
        "building indexes"
    );

    let mut entries: Vec<(Document, Vec<f32>)> = Vec::new();
    let mut to_embed: Vec<Document> = Vec::new();
    for document in &documents {
        if let Some(precomputed) = &document.embedding {
            match renormalize(precomputed) {
                Some(vector) => entries.push((document.clone(), vector)),
                None => {
                    warn!(doc_id = %document.id, "precomputed embedding has zero norm, dense-skipped")
                }
            }
        } else if !document.content.trim().is_empty() {
            to_embed.push(document.clone());
        } else {
            debug!(doc_id = %document.id, "no content to embed, document is sparse-only");
        }
    }

    for chunk in to_embed.chunks(config.embed_batch_size) {
        let batch: Vec<(String, String)> = chunk
            .iter()
            .map(|d| (d.id.clone(), d.content.clone()))
            .collect();
        match embedder.embed_batch(&batch, EmbedRole::Document).await {
            Ok(results) => {
                for (document, result) in chunk.iter().zip(results) {
                    match result {
                        Ok(embedding) => entries.push((document.clone(), embedding.vector)),
                        Err(err) => {
                            // The document stays searchable through BM25.
                            warn!(doc_id = %document.id, error = %err, "dropping document from dense index")
                        }
                    }
                }
            }
            Err(batch_err) => {
                warn!(error = %batch_err, "batch embedding failed, retrying per document");
                for document in chunk {
                    match embedder
                        .embed(&document.id, &document.content, EmbedRole::Document)
                        .await
                    {
                        Ok(embedding) => entries.push((document.clone(), embedding.vector)),
                        Err(err) => {
                            warn!(doc_id = %document.id, error = %err, "dropping document from dense index")
                        }
                    }
                }
            }
        }
    }

    let mut dense_index = match config.dense_index {
        IndexKind::Flat => DenseIndex::flat(embedder.dimension())?,
        IndexKind::Ivf { nlist } => {
            let mut index = DenseIndex::ivf(embedder.dimension(), nlist)?;
            let sample: Vec<Vec<f32>> = entries.iter().map(|(_, v)| v.clone()).collect();
            index.train(&sample)?;
            index
        }
    };
    let accepted = dense_index.add(entries)?;
    let sparse_index = Bm25Index::fit(documents.clone(), config.bm25, config.tokenizer)?;
    info!(
        dense = accepted,
        sparse = sparse_index.len(),
        "indexes built"
    );

    let build_time = build_start.elapsed().as_secs_f64();

    let paths = IndexPaths::new(&config.data_dir);
    let save_outcome = (|| -> Result<(), EngineError> {
        std::fs::create_dir_all(paths.dir())
            .map_err(|e| EngineError::Cache(format!("cannot create index dir: {e}")))?;
        dense_index.save(&paths.dense_vectors(), &paths.dense_metadata())?;
        sparse_index.save(&paths.sparse())?;
        cache::write_manifest(&paths, &CacheManifest::new(documents.len(), build_time))
    })();
    if let Err(err) = save_outcome {
        warn!(error = %err, "failed to save index snapshot, continuing with in-memory indexes");
    }

    Ok((dense_index, sparse_index, build_time))
}

fn renormalize(vector: &[f32]) -> Option<Vec<f32>> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        Some(vector.iter().map(|x| x / norm).collect())
    } else {
        None
    }
}

fn to_retrieved(hit: &FusedHit, document: &Document) -> RetrievedDocument {
    RetrievedDocument {
        title: document.title.clone(),
        source: document.source_tag.clone(),
        content_preview: preview(&document.content),
        score: hit.combined_score,
        retrieval_method: hit.retrieval_method().to_string(),
        reference: document.reference(),
        matched_tokens: hit.matched_tokens.clone(),
    }
}

/// First [`PREVIEW_CHARS`] characters of the content, with an ellipsis when
/// truncated.
fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn unique_sources(documents: &[RetrievedDocument]) -> Vec<String> {
    let mut seen = Vec::new();
    for document in documents {
        if !seen.contains(&document.source) {
            seen.push(document.source.clone());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_at_limit() {
        let short = "pendek".to_string();
        assert_eq!(preview(&short), "pendek");

        let long = "x".repeat(PREVIEW_CHARS + 50);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
    }

    #[test]
    fn preview_exactly_at_limit_has_no_ellipsis() {
        let exact = "y".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn unique_sources_preserve_rank_order() {
        let make = |source: &str| RetrievedDocument {
            title: String::new(),
            source: source.into(),
            content_preview: String::new(),
            score: 0.0,
            retrieval_method: "hybrid".into(),
            reference: String::new(),
            matched_tokens: Vec::new(),
        };
        let docs = vec![make("ncbi"), make("drive"), make("ncbi")];
        assert_eq!(unique_sources(&docs), vec!["ncbi", "drive"]);
    }

    #[test]
    fn renormalize_rejects_zero_and_scales() {
        assert_eq!(renormalize(&[0.0, 0.0]), None);
        let v = renormalize(&[3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn degrade_target_prefers_surviving_leg() {
        assert_eq!(
            degrade_target(&EngineError::DenseLeg("x".into())),
            EngineState::DegradedSparse
        );
        assert_eq!(
            degrade_target(&EngineError::SparseLeg("x".into())),
            EngineState::DegradedDense
        );
        assert_eq!(
            degrade_target(&EngineError::Timeout(Duration::from_secs(1))),
            EngineState::DegradedDense
        );
    }
}
