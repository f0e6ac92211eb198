//! Configuration for the RAG service.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::index::DEFAULT_EMBED_BATCH_SIZE;

/// Default number of results returned by a query.
pub const DEFAULT_TOP_K: usize = 3;

/// Configuration parameters for [`RagService`](crate::service::RagService).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Number of results returned when a query does not set `top_k`.
    pub default_top_k: usize,
    /// Number of texts sent per embedding request while building the index.
    pub embed_batch_size: usize,
    /// Model used to answer questions when a query does not name one.
    pub generation_model: String,
    /// Vision-capable model used for image insights.
    pub vision_model: String,
    /// Directory holding per-request temporary uploads.
    pub upload_dir: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            default_top_k: DEFAULT_TOP_K,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            generation_model: "gemini-2.5-flash".to_string(),
            vision_model: "gemini-2.5-flash".to_string(),
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the default number of query results.
    pub fn default_top_k(mut self, k: usize) -> Self {
        self.config.default_top_k = k;
        self
    }

    /// Set the embedding batch size used during index builds.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the default generation model.
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    /// Set the vision model.
    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    /// Set the upload directory.
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `default_top_k == 0`
    /// - `embed_batch_size == 0`
    /// - a model name is blank
    pub fn build(self) -> Result<RagConfig> {
        if self.config.default_top_k == 0 {
            return Err(RagError::Config("default_top_k must be greater than zero".to_string()));
        }
        if self.config.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be greater than zero".to_string()));
        }
        if self.config.generation_model.trim().is_empty() {
            return Err(RagError::Config("generation_model must not be empty".to_string()));
        }
        if self.config.vision_model.trim().is_empty() {
            return Err(RagError::Config("vision_model must not be empty".to_string()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.default_top_k, 3);
        assert_eq!(config, RagConfig::default());
    }

    #[test]
    fn rejects_zero_top_k() {
        let err = RagConfig::builder().default_top_k(0).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn rejects_zero_batch_and_blank_models() {
        assert!(RagConfig::builder().embed_batch_size(0).build().is_err());
        assert!(RagConfig::builder().generation_model("  ").build().is_err());
        assert!(RagConfig::builder().vision_model("").build().is_err());
    }
}
