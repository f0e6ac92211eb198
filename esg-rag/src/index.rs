//! Embedding index: an immutable, fully embedded snapshot of the corpus and
//! the handle that publishes it.
//!
//! A [`VectorIndex`] is never mutated after [`VectorIndex::build`] returns.
//! Refreshing builds a fresh index and swaps it into the [`IndexHandle`] with
//! a single `Arc` replacement, so concurrent readers observe either the old
//! or the new snapshot, never a mix.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::document::{DocumentRecord, IndexedChunk, ScoredResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::source::DocumentSource;

/// Default number of texts per embedding request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// An immutable nearest-neighbor index over embedded records.
///
/// Every chunk carries an embedding of the same dimension produced by the
/// same embedding model, which the index records as
/// [`embedding_model`](Self::embedding_model).
#[derive(Debug, Clone)]
pub struct VectorIndex {
    chunks: Vec<IndexedChunk>,
    embedding_model: String,
    dimensions: usize,
    built_at: DateTime<Utc>,
}

impl VectorIndex {
    /// Embed `records` with `embedder` and build a new index.
    ///
    /// Records are embedded in batches of `batch_size`. Chunk ids follow the
    /// input order, so rebuilding from the same records yields the same ids.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] if `records` is empty.
    /// - [`RagError::Embedding`] if the provider fails or returns malformed
    ///   vectors (wrong count, empty, inconsistent dimension, non-finite).
    pub async fn build(
        records: Vec<DocumentRecord>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        let batch_size = batch_size.max(1);
        let provider = embedder.provider_name();
        let declared = embedder.dimensions();

        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(records.len());
        for batch in records.chunks(batch_size) {
            let texts: Vec<&str> = batch.iter().map(|r| r.content.as_str()).collect();
            let vectors = embedder.embed_batch(&texts).await.map_err(|e| {
                error!(provider, error = %e, "embedding failed during index build");
                e
            })?;
            if vectors.len() != texts.len() {
                return Err(RagError::embedding(
                    provider,
                    format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
                ));
            }
            debug!(provider, batch_size = texts.len(), "embedded batch");
            embeddings.extend(vectors);
        }

        let dimensions = embeddings[0].len();
        if dimensions == 0 {
            return Err(RagError::embedding(provider, "provider returned an empty embedding"));
        }
        if declared != 0 && declared != dimensions {
            return Err(RagError::embedding(
                provider,
                format!("provider declares {declared} dimensions but returned {dimensions}"),
            ));
        }
        for (position, embedding) in embeddings.iter().enumerate() {
            validate_vector(embedding, dimensions)
                .map_err(|e| RagError::embedding(provider, format!("record {position}: {e}")))?;
        }

        let chunks = records
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, (record, embedding))| IndexedChunk {
                id: format!("chunk-{position}"),
                record,
                embedding,
            })
            .collect::<Vec<_>>();

        info!(
            chunk_count = chunks.len(),
            dimensions,
            embedding_model = embedder.model_id(),
            "built vector index"
        );

        Ok(Self {
            chunks,
            embedding_model: embedder.model_id().to_string(),
            dimensions,
            built_at: Utc::now(),
        })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks. Never true for a built index.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The indexed chunks in insertion order.
    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// The embedding model every chunk was embedded with.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Dimension of every embedding in the index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// When the index was built.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Return the `top_k` chunks most similar to `embedding`.
    ///
    /// Ordered by descending cosine similarity; equal scores keep insertion
    /// order. The caller guarantees `embedding` has [`dimensions`](Self::dimensions)
    /// entries.
    pub fn nearest(&self, embedding: &[f32], top_k: usize) -> Vec<ScoredResult> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(position, chunk)| (position, cosine_similarity(&chunk.embedding, embedding)))
            .collect();

        // `sort_by` is stable, so ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(position, score)| ScoredResult::from_chunk(&self.chunks[position], score))
            .collect()
    }
}

pub(crate) fn validate_vector(embedding: &[f32], dimensions: usize) -> std::result::Result<(), String> {
    if embedding.len() != dimensions {
        return Err(format!("expected {dimensions} dimensions, got {}", embedding.len()));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err("embedding contains non-finite values".to_string());
    }
    Ok(())
}

/// A shared, atomically replaceable slot holding the current [`VectorIndex`].
///
/// Cloning the handle shares the slot. Readers take a cheap `Arc` snapshot
/// with [`current`](Self::current) and release the lock immediately; no lock
/// is held while embedding or generating. Rebuilds are serialized so at most
/// one is in flight.
#[derive(Debug, Clone, Default)]
pub struct IndexHandle {
    current: Arc<RwLock<Option<Arc<VectorIndex>>>>,
    build_lock: Arc<Mutex<()>>,
}

impl IndexHandle {
    /// Create an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the published index, if any.
    pub async fn current(&self) -> Option<Arc<VectorIndex>> {
        self.current.read().await.clone()
    }

    /// Whether an index is published. Never triggers a build.
    pub async fn is_loaded(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Publish `index`, replacing any previous one. Returns the replaced index.
    pub async fn publish(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        let index = Arc::new(index);
        let mut slot = self.current.write().await;
        slot.replace(index)
    }

    /// Remove the published index.
    pub async fn clear(&self) -> Option<Arc<VectorIndex>> {
        self.current.write().await.take()
    }

    /// Fetch from `source`, build a fresh index, and publish it.
    ///
    /// Returns the number of indexed records. On any failure the previously
    /// published index stays in place.
    ///
    /// # Errors
    ///
    /// Propagates [`RagError::DataSource`], [`RagError::EmptyCorpus`] and
    /// [`RagError::Embedding`].
    pub async fn rebuild(
        &self,
        source: &dyn DocumentSource,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<usize> {
        let _guard = self.build_lock.lock().await;

        let records = source.fetch().await.map_err(|e| {
            error!(source = source.name(), error = %e, "failed to fetch documents");
            e
        })?;
        info!(source = source.name(), record_count = records.len(), "fetched documents");

        let index = VectorIndex::build(records, embedder, batch_size).await?;
        let count = index.len();
        let replaced = self.publish(index).await;

        info!(
            document_count = count,
            replaced_count = replaced.as_ref().map(|i| i.len()),
            "published vector index"
        );
        Ok(count)
    }
}
