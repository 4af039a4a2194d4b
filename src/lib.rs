//! MedRAG: hybrid retrieval engine for a medical-document RAG pipeline.
//!
//! This crate re-exports the public API of the stage crates so applications
//! can depend on `medrag` alone:
//!
//! - [`textproc`]: tokenizer (casefold, stop words, stemming)
//! - [`embed`]: embedding client (remote model or deterministic hash)
//! - [`dense`]: flat / IVF vector index
//! - [`sparse`]: BM25 keyword index
//! - [`corpus`]: JSON corpus loader
//! - [`engine`]: hybrid searcher, index cache, retrieval facade, fallback
//!
//! The usual entry point is [`RagEngine`]: build or load the indexes once,
//! then run queries against the facade.

pub use corpus::{count_documents, load_corpus, CorpusError, CorpusLoad, Document};
pub use dense::{DenseHit, DenseIndex, DenseIndexError, IndexKind};
pub use embed::{EmbedConfig, EmbedError, EmbedMode, EmbedRole, Embedder, Embedding, RetryConfig};
pub use engine::{
    EngineConfig, EngineError, EngineState, EngineStats, ExtractiveGenerator, FailingGenerator,
    FusionStrategy, Generator, GeneratorError, HybridConfig, HybridSearcher, QueryResult,
    RagEngine, RetrievedDocument, APOLOGY, INSUFFICIENT_CONTEXT,
};
pub use sparse::{Bm25Index, Bm25Params, SparseHit, SparseIndexError};
pub use textproc::{Language, Tokenizer, TokenizerConfig};
