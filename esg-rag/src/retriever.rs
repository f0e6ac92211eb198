//! Query-time retrieval over a published [`VectorIndex`].

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::ScoredResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{VectorIndex, validate_vector};

/// Embeds queries and looks up their nearest neighbors.
///
/// A `top_k` of zero is rejected with [`RagError::InvalidArgument`]; it is
/// never clamped. The index's recorded embedding model must match the embedder's
/// [`model_id`](EmbeddingProvider::model_id), otherwise the retriever fails
/// fast with [`RagError::EmbeddingModelMismatch`].
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    /// Create a retriever embedding queries with `embedder`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// The query-time embedder.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Return up to `top_k` records most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] for a blank query or `top_k == 0`.
    /// - [`RagError::EmbeddingModelMismatch`] if the index was built with a
    ///   different embedding model.
    /// - [`RagError::Embedding`] if the query cannot be embedded, its
    ///   dimension differs from the index, or it holds non-finite values.
    pub async fn retrieve(&self, index: &VectorIndex, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be a positive integer, got 0".to_string()));
        }
        if query.trim().is_empty() {
            return Err(RagError::InvalidArgument("query text must not be empty".to_string()));
        }

        let query_model = self.embedder.model_id();
        if index.embedding_model() != query_model {
            error!(index_model = index.embedding_model(), query_model, "embedding model mismatch");
            return Err(RagError::EmbeddingModelMismatch {
                index_model: index.embedding_model().to_string(),
                query_model: query_model.to_string(),
            });
        }

        let provider = self.embedder.provider_name();
        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(provider, error = %e, "embedding failed during query");
            e
        })?;
        validate_vector(&embedding, index.dimensions()).map_err(|e| {
            error!(provider, error = %e, "malformed query embedding");
            RagError::embedding(provider, format!("query embedding: {e}"))
        })?;

        let results = index.nearest(&embedding, top_k);
        debug!(top_score = results.first().map(|r| r.score), "nearest neighbors computed");
        info!(top_k, result_count = results.len(), "retrieval completed");
        Ok(results)
    }
}

/// Validate a requested result count.
///
/// # Errors
///
/// Returns [`RagError::InvalidArgument`] when `top_k <= 0`.
pub fn validate_top_k(top_k: i64) -> Result<usize> {
    if top_k <= 0 {
        return Err(RagError::InvalidArgument(format!("top_k must be a positive integer, got {top_k}")));
    }
    usize::try_from(top_k).map_err(|_| RagError::InvalidArgument(format!("top_k {top_k} is too large")))
}
