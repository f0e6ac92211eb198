//! RAG service orchestrator.
//!
//! The [`RagService`] owns the [`IndexHandle`] and the collaborators and
//! exposes the operations a transport layer calls: startup load, refresh,
//! health, similar-document search, grounded answers, image insights and
//! feedback.
//!
//! # Example
//!
//! ```rust,ignore
//! use esg_rag::{RagService, RagConfig, StaticSource};
//!
//! let service = RagService::builder()
//!     .config(RagConfig::default())
//!     .source(Arc::new(StaticSource::new(records)))
//!     .embedding_provider(Arc::new(embedder))
//!     .generation_provider(Arc::new(generator))
//!     .build()?;
//!
//! service.refresh().await?;
//! let answer = service.answer(&QueryRequest::new("What happened to Scope 1 emissions?")).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::RagConfig;
use crate::document::ScoredResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::feedback::{FeedbackRecord, FeedbackSink, InMemoryFeedbackSink};
use crate::generation::{GenerationProvider, ImageInput};
use crate::generator::AnswerGenerator;
use crate::index::{IndexHandle, VectorIndex};
use crate::language::ResponseLanguage;
use crate::retriever::{Retriever, validate_top_k};
use crate::source::DocumentSource;
use crate::vision::ImageInsightExtractor;

/// A query as received from a caller, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A validated query with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub text: String,
    pub top_k: usize,
    pub model: String,
    pub language: ResponseLanguage,
}

impl Query {
    /// Validate `request` and fill in defaults from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for blank text, `top_k <= 0`,
    /// a blank model name or an unknown language.
    pub fn from_request(request: &QueryRequest, config: &RagConfig) -> Result<Self> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(RagError::InvalidArgument("query text must not be empty".to_string()));
        }
        let top_k = match request.top_k {
            Some(k) => validate_top_k(k)?,
            None => config.default_top_k,
        };
        let model = match request.model.as_deref().map(str::trim) {
            Some("") => return Err(RagError::InvalidArgument("model must not be empty".to_string())),
            Some(model) => model.to_string(),
            None => config.generation_model.clone(),
        };
        let language = ResponseLanguage::parse_optional(request.language.as_deref())?;

        Ok(Self { text: text.to_string(), top_k, model, language })
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub document_count: usize,
}

/// Readiness snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub index_loaded: bool,
    pub document_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// A grounded answer and the passages it was grounded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<ScoredResult>>,
}

/// The RAG service.
///
/// Construct one via [`RagService::builder()`].
pub struct RagService {
    config: RagConfig,
    source: Arc<dyn DocumentSource>,
    retriever: Retriever,
    generator: AnswerGenerator,
    vision: ImageInsightExtractor,
    feedback: Arc<dyn FeedbackSink>,
    index: IndexHandle,
}

impl RagService {
    /// Create a new [`RagServiceBuilder`].
    pub fn builder() -> RagServiceBuilder {
        RagServiceBuilder::default()
    }

    /// Return a reference to the service configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the index handle shared with this service.
    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Build the index at startup.
    ///
    /// Failures are logged, not returned: an empty source or an unreachable
    /// provider leaves the service running without an index. Returns whether
    /// an index is loaded afterwards.
    pub async fn load(&self) -> bool {
        match self.rebuild().await {
            Ok(count) => {
                info!(document_count = count, "vector store loaded");
                true
            }
            Err(RagError::EmptyCorpus) => {
                warn!(source = self.source.name(), "no data found in source, starting without an index");
                false
            }
            Err(e) => {
                error!(error = %e, "failed to load vector store, starting without an index");
                false
            }
        }
    }

    /// Rebuild the index from the source and publish it.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] if the source yields no records.
    /// - [`RagError::DataSource`] or [`RagError::Embedding`] on upstream failure.
    ///
    /// The previously published index stays in place on any failure.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let document_count = self.rebuild().await?;
        Ok(RefreshReport { document_count })
    }

    async fn rebuild(&self) -> Result<usize> {
        self.index
            .rebuild(self.source.as_ref(), self.retriever.embedder().as_ref(), self.config.embed_batch_size)
            .await
    }

    /// Report whether an index is loaded. Never triggers a build.
    pub async fn health(&self) -> HealthStatus {
        match self.index.current().await {
            Some(index) => HealthStatus {
                index_loaded: true,
                document_count: index.len(),
                embedding_model: Some(index.embedding_model().to_string()),
            },
            None => HealthStatus { index_loaded: false, document_count: 0, embedding_model: None },
        }
    }

    async fn require_index(&self) -> Result<Arc<VectorIndex>> {
        self.index.current().await.ok_or(RagError::ServiceUnavailable)
    }

    /// Return the records most similar to the query text, without generation.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidArgument`], [`RagError::ServiceUnavailable`], or
    /// any retrieval error.
    pub async fn similar_documents(&self, request: &QueryRequest) -> Result<Vec<ScoredResult>> {
        let query = Query::from_request(request, &self.config)?;
        let index = self.require_index().await?;
        self.retriever.retrieve(&index, &query.text, query.top_k).await
    }

    /// Retrieve, then generate a grounded answer.
    ///
    /// Retrieval always uses the raw query text; the language instruction is
    /// applied only to the question handed to the generator.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidArgument`], [`RagError::ServiceUnavailable`], any
    /// retrieval error, or [`RagError::Generation`].
    pub async fn answer(&self, request: &QueryRequest) -> Result<AnswerResponse> {
        let query = Query::from_request(request, &self.config)?;
        let index = self.require_index().await?;

        let sources = self.retriever.retrieve(&index, &query.text, query.top_k).await?;
        // Drop the snapshot before the generation call.
        drop(index);

        let question = query.language.apply(&query.text);
        let answer = self.generator.generate(&question, &sources, &query.model).await?;

        info!(
            model = %query.model,
            language = %query.language,
            source_count = sources.len(),
            "answered query"
        );
        Ok(AnswerResponse { answer: answer.text, sources: Some(sources) })
    }

    /// Extract insights from an in-memory image.
    ///
    /// # Errors
    ///
    /// [`RagError::Vision`] on provider failure.
    pub async fn analyze_image(&self, image: &ImageInput) -> Result<String> {
        self.vision.analyze(image).await
    }

    /// Stage an uploaded file in the upload directory, analyze it, and remove it.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidArgument`] for empty or non-image uploads,
    /// [`RagError::Vision`] on provider or staging failure.
    pub async fn analyze_upload(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        self.vision.analyze_upload(&self.config.upload_dir, file_name, bytes).await
    }

    /// The directory holding temporary uploads.
    pub fn upload_dir(&self) -> &Path {
        &self.config.upload_dir
    }

    /// Record a user rating.
    ///
    /// # Errors
    ///
    /// [`RagError::InvalidArgument`] for an out-of-range rating,
    /// [`RagError::Feedback`] if the sink cannot store it.
    pub async fn submit_feedback(&self, record: FeedbackRecord) -> Result<()> {
        let rating = record.rating;
        self.feedback.record(record).await.map_err(|e| {
            warn!(rating, error = %e, "failed to record feedback");
            e
        })?;
        info!(rating, "feedback recorded");
        Ok(())
    }
}

/// Builder for constructing a [`RagService`].
///
/// `config`, `source`, `embedding_provider` and `generation_provider` are
/// required. The feedback sink defaults to [`InMemoryFeedbackSink`] and the
/// index handle to a fresh, empty one.
#[derive(Default)]
pub struct RagServiceBuilder {
    config: Option<RagConfig>,
    source: Option<Arc<dyn DocumentSource>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    feedback_sink: Option<Arc<dyn FeedbackSink>>,
    index: Option<IndexHandle>,
}

impl RagServiceBuilder {
    /// Set the service configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document source.
    pub fn source(mut self, source: Arc<dyn DocumentSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the embedding provider used for both index builds and queries.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider used for answers and image insights.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Set the feedback sink.
    pub fn feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback_sink = Some(sink);
        self
    }

    /// Share an existing index handle.
    pub fn index(mut self, index: IndexHandle) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the [`RagService`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing.
    pub fn build(self) -> Result<RagService> {
        let config = self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        let source = self.source.ok_or_else(|| RagError::Config("source is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::Config("generation_provider is required".to_string()))?;

        Ok(RagService {
            retriever: Retriever::new(embedding_provider),
            generator: AnswerGenerator::new(generation_provider.clone()),
            vision: ImageInsightExtractor::new(generation_provider, config.vision_model.clone()),
            feedback: self.feedback_sink.unwrap_or_else(|| Arc::new(InMemoryFeedbackSink::new())),
            index: self.index.unwrap_or_default(),
            source,
            config,
        })
    }
}
