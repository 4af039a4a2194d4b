//! Hybrid retrieval engine for the medical-document RAG pipeline.
//!
//! This crate glues the pipeline stages into one engine: it loads or builds
//! the dense and sparse indexes ([`cache`]), runs both search legs
//! concurrently and fuses their rankings ([`HybridSearcher`]), orchestrates
//! retrieval plus generation behind a single facade ([`RagEngine`]), and
//! contains query-time failure inside the fallback controller so callers
//! always receive a well-formed [`QueryResult`].
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine::{EngineConfig, ExtractiveGenerator, RagEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), engine::EngineError> {
//!     let config = EngineConfig::new("./data");
//!     let engine = RagEngine::load_or_build(config, Arc::new(ExtractiveGenerator)).await?;
//!     let result = engine.query("tekanan darah tinggi", Some(5), None).await;
//!     println!("{}", result.response);
//!     Ok(())
//! }
//! ```

pub mod cache;

mod config;
mod error;
mod fallback;
mod fusion;
mod generator;
mod hybrid;
mod query;
mod stats;

pub use crate::config::{EngineConfig, FusionStrategy, HybridConfig};
pub use crate::error::EngineError;
pub use crate::fallback::EngineState;
pub use crate::fusion::FusedHit;
pub use crate::generator::{
    build_prompt, format_context, system_prompt_for_tag, ContextPassage, ExtractiveGenerator,
    FailingGenerator, Generator, GeneratorError, APOLOGY, INSUFFICIENT_CONTEXT,
};
pub use crate::hybrid::HybridSearcher;
pub use crate::query::{
    EngineStats, PerformanceMetadata, QueryMetadata, QueryResult, RagEngine, RetrievedDocument,
};
pub use crate::stats::SearchStatsSnapshot;
