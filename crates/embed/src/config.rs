use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::EmbedError;

/// Backend selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    /// Deterministic bag-of-token hash vectors. No network, no secrets;
    /// the offline/local-encoder stand-in and the test backend.
    #[default]
    Hash,
    /// Remote embedding model over HTTPS.
    Api,
}

/// Runtime configuration of the embedding client.
///
/// The dimension fixed here is the engine-wide `D`: every stored vector and
/// every query vector must match it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedConfig {
    /// Backend selector. Default [`EmbedMode::Hash`].
    pub mode: EmbedMode,
    /// Vector dimension `D`. 384 for the hash backend, 768 for the remote
    /// model.
    pub dimension: usize,
    /// Label surfaced on every [`Embedding`](crate::Embedding).
    pub model_name: String,
    /// Remote endpoint base URL (required in api mode).
    pub api_url: Option<String>,
    /// API key for the remote endpoint (required in api mode).
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Input truncation limit in characters before the backend call.
    pub max_chars: usize,
    /// Retry policy for upstream failures.
    pub retry: RetryConfig,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self::hash(384)
    }
}

impl EmbedConfig {
    /// Deterministic hash backend with the given dimension.
    pub fn hash(dimension: usize) -> Self {
        Self {
            mode: EmbedMode::Hash,
            dimension,
            model_name: format!("hash-sinusoid-{dimension}"),
            api_url: None,
            api_key: None,
            timeout_secs: 30,
            max_chars: 8_000,
            retry: RetryConfig::default(),
        }
    }

    /// Remote model backend (dimension 768).
    pub fn api(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            mode: EmbedMode::Api,
            dimension: 768,
            model_name: "text-embedding-004".into(),
            api_url: Some(api_url.into()),
            api_key: Some(api_key.into()),
            timeout_secs: 30,
            max_chars: 8_000,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks the configuration is internally usable.
    pub fn validate(&self) -> Result<(), EmbedError> {
        if self.dimension == 0 {
            return Err(EmbedError::InvalidConfig(
                "dimension must be greater than zero".into(),
            ));
        }
        if self.max_chars < 8_000 {
            return Err(EmbedError::InvalidConfig(
                "max_chars must be at least 8000".into(),
            ));
        }
        if self.mode == EmbedMode::Api {
            if self.api_url.as_deref().map_or(true, str::is_empty) {
                return Err(EmbedError::InvalidConfig(
                    "api_url is required for api mode".into(),
                ));
            }
            if self.api_key.as_deref().map_or(true, str::is_empty) {
                return Err(EmbedError::InvalidConfig(
                    "api_key is required for api mode".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_default_is_valid() {
        assert!(EmbedConfig::default().validate().is_ok());
        assert_eq!(EmbedConfig::default().dimension, 384);
    }

    #[test]
    fn api_mode_requires_endpoint_and_key() {
        let cfg = EmbedConfig {
            mode: EmbedMode::Api,
            api_url: None,
            ..EmbedConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EmbedError::InvalidConfig(_))));

        let cfg = EmbedConfig::api("https://example.invalid/v1", "key");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.dimension, 768);
    }

    #[test]
    fn zero_dimension_rejected() {
        let cfg = EmbedConfig::hash(0);
        assert!(matches!(cfg.validate(), Err(EmbedError::InvalidConfig(_))));
    }

    #[test]
    fn truncation_floor_enforced() {
        let cfg = EmbedConfig::default().with_max_chars(100);
        assert!(matches!(cfg.validate(), Err(EmbedError::InvalidConfig(_))));
    }
}
