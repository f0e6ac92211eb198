//! Deterministic offline providers for tests and local runs.
//!
//! - [`HashingEmbeddingProvider`]: bag-of-words feature hashing, no network
//! - [`EchoGenerationProvider`]: returns the prompt it was given and records every call
//! - [`StubEmbeddingProvider`]: replays a fixed sequence of vectors
//! - [`FailingEmbeddingProvider`] / [`FailingGenerationProvider`]: always fail

use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, ImageInput};

/// Embeds text by hashing lowercase alphanumeric tokens into a fixed number
/// of buckets and L2-normalizing the counts.
///
/// Identical texts always get identical vectors, and texts sharing words get
/// positive cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing vectors of `dimensions` entries.
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self { dimensions, model_id: format!("hashing-bow-{dimensions}") }
    }

    /// Override the reported model id.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            let bucket = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn provider_name(&self) -> &str {
        "Hashing"
    }
}

/// Replays a fixed sequence of vectors, one per embedded text, in call order.
///
/// Once the sequence is exhausted, batches come back short and single
/// embeds fail.
#[derive(Debug)]
pub struct StubEmbeddingProvider {
    vectors: Vec<Vec<f32>>,
    cursor: Mutex<usize>,
}

impl StubEmbeddingProvider {
    /// Create a stub replaying `vectors`.
    pub fn new(vectors: Vec<Vec<f32>>) -> Self {
        Self { vectors, cursor: Mutex::new(0) }
    }

    fn take(&self, count: usize) -> Vec<Vec<f32>> {
        let mut cursor = self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let start = (*cursor).min(self.vectors.len());
        let end = (start + count).min(self.vectors.len());
        *cursor = end;
        self.vectors[start..end].to_vec()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.take(1)
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(self.provider_name(), "stub sequence exhausted"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(self.take(texts.len()))
    }

    fn dimensions(&self) -> usize {
        self.vectors.first().map_or(0, Vec::len)
    }

    fn model_id(&self) -> &str {
        "stub"
    }

    fn provider_name(&self) -> &str {
        "Stub"
    }
}

/// An embedding provider that always fails, as an unreachable backend would.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::embedding(self.provider_name(), "connection refused"))
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn model_id(&self) -> &str {
        "failing"
    }

    fn provider_name(&self) -> &str {
        "Failing"
    }
}

/// A generation call captured by [`EchoGenerationProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Model the call was addressed to.
    pub model: String,
    /// Full prompt text.
    pub prompt: String,
    /// MIME type of the attached image, for vision calls.
    pub image_mime_type: Option<String>,
}

/// Returns every prompt verbatim and records the calls it received.
#[derive(Debug, Default)]
pub struct EchoGenerationProvider {
    calls: Mutex<Vec<RecordedCall>>,
}

impl EchoGenerationProvider {
    /// Create a provider with an empty call log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(call);
    }
}

#[async_trait]
impl GenerationProvider for EchoGenerationProvider {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        self.record(RecordedCall { model: model.to_string(), prompt: prompt.to_string(), image_mime_type: None });
        Ok(prompt.to_string())
    }

    async fn describe_image(&self, image: &ImageInput, prompt: &str, model: &str) -> Result<String> {
        self.record(RecordedCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            image_mime_type: Some(image.mime_type.clone()),
        });
        Ok(format!("{} image of {} bytes analyzed", image.mime_type, image.bytes.len()))
    }

    fn provider_name(&self) -> &str {
        "Echo"
    }
}

/// A generation provider that always fails, as a timed-out backend would.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingGenerationProvider;

#[async_trait]
impl GenerationProvider for FailingGenerationProvider {
    async fn complete(&self, _prompt: &str, model: &str) -> Result<String> {
        Err(RagError::generation(self.provider_name(), format!("request to '{model}' timed out")))
    }

    async fn describe_image(&self, _image: &ImageInput, _prompt: &str, model: &str) -> Result<String> {
        Err(RagError::vision(self.provider_name(), format!("request to '{model}' timed out")))
    }

    fn provider_name(&self) -> &str {
        "Failing"
    }
}
