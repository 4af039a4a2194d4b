use std::path::PathBuf;

use dense::IndexKind;
use embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use sparse::Bm25Params;
use textproc::TokenizerConfig;

use crate::EngineError;

/// Rule for combining the two engines' rankings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Min-max normalized scores blended with the configured weights.
    #[default]
    WeightedSum,
    /// `1/(60 + rank)` per engine, summed.
    ReciprocalRankFusion,
    /// Weighted sum with weights picked per query shape.
    Adaptive,
}

/// Configuration of the hybrid searcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HybridConfig {
    /// Weight of the dense engine in the weighted sum. Default 0.6.
    pub vector_weight: f32,
    /// Weight of the keyword engine in the weighted sum. Default 0.4.
    pub keyword_weight: f32,
    /// Candidates requested from the dense leg. Default 20.
    pub vector_top_k: usize,
    /// Candidates requested from the keyword leg. Default 20.
    pub keyword_top_k: usize,
    /// Result count when the caller does not specify one. Default 10.
    pub final_top_k: usize,
    #[serde(default)]
    pub fusion: FusionStrategy,
    /// Run the two legs concurrently. Fusion output does not depend on
    /// arrival order, so this only affects latency. Default true.
    pub parallel: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.6,
            keyword_weight: 0.4,
            vector_top_k: 20,
            keyword_top_k: 20,
            final_top_k: 10,
            fusion: FusionStrategy::default(),
            parallel: true,
        }
    }
}

impl HybridConfig {
    pub fn with_fusion(mut self, fusion: FusionStrategy) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_weights(mut self, vector_weight: f32, keyword_weight: f32) -> Self {
        self.vector_weight = vector_weight;
        self.keyword_weight = keyword_weight;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_final_top_k(mut self, final_top_k: usize) -> Self {
        self.final_top_k = final_top_k;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.vector_weight < 0.0 || self.keyword_weight < 0.0 {
            return Err(EngineError::InvalidConfig(
                "fusion weights must be non-negative".into(),
            ));
        }
        if self.vector_weight + self.keyword_weight <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "at least one fusion weight must be positive".into(),
            ));
        }
        if self.vector_top_k == 0 || self.keyword_top_k == 0 || self.final_top_k == 0 {
            return Err(EngineError::InvalidConfig(
                "top_k values must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level engine configuration: where the corpus lives and how every
/// stage is parameterized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Directory holding the source JSON corpus; snapshots go to its
    /// `indexes/` subdirectory. Must exist at startup.
    pub data_dir: PathBuf,
    pub embed: EmbedConfig,
    pub tokenizer: TokenizerConfig,
    pub bm25: Bm25Params,
    pub hybrid: HybridConfig,
    /// Dense index variant built at ingest. Default flat.
    pub dense_index: IndexKind,
    /// Per-query deadline in seconds. Default 30.
    pub timeout_secs: u64,
    /// Documents per embedding batch during the build phase. Default 32.
    pub embed_batch_size: usize,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            embed: EmbedConfig::default(),
            tokenizer: TokenizerConfig::default(),
            bm25: Bm25Params::default(),
            hybrid: HybridConfig::default(),
            dense_index: IndexKind::Flat,
            timeout_secs: 30,
            embed_batch_size: 32,
        }
    }

    pub fn with_embed(mut self, embed: EmbedConfig) -> Self {
        self.embed = embed;
        self
    }

    pub fn with_hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.hybrid = hybrid;
        self
    }

    pub fn with_dense_index(mut self, kind: IndexKind) -> Self {
        self.dense_index = kind;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.hybrid.validate()?;
        if self.timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "embed_batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
