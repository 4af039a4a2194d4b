//! Error surface of the retrieval engine.
//!
//! Build-time errors (corpus, index, snapshot) surface directly; query-time
//! errors are contained by the fallback controller so the facade always
//! returns a well-formed result object.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
    #[error("corpus error: {0}")]
    Corpus(#[from] corpus::CorpusError),
    #[error("embedding error: {0}")]
    Embed(#[from] embed::EmbedError),
    #[error("dense index error: {0}")]
    Dense(#[from] dense::DenseIndexError),
    #[error("sparse index error: {0}")]
    Sparse(#[from] sparse::SparseIndexError),
    /// Snapshot manifest could not be read or written.
    #[error("cache error: {0}")]
    Cache(String),
    /// The dense search leg failed (embedding transport, index fault).
    #[error("dense search leg failed: {0}")]
    DenseLeg(String),
    /// The sparse search leg failed.
    #[error("sparse search leg failed: {0}")]
    SparseLeg(String),
    #[error("query exceeded deadline of {0:?}")]
    Timeout(Duration),
    /// Both the hybrid path and the degraded retry have failed for good.
    #[error("retrieval engine is in error-only state")]
    ErrorOnly,
}
