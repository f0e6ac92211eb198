//! Error types for the `esg-rag` crate.

use std::fmt;

use thiserror::Error;

/// Errors that can occur in RAG operations.
///
/// Every external call site maps its provider- or backend-specific failure
/// into one of these variants so callers can tell "not ready yet" from
/// "upstream broken" from "bad request".
#[derive(Debug, Error)]
pub enum RagError {
    /// The document source was unreachable or returned malformed rows.
    #[error("Data source error ({source_name}): {message}")]
    DataSource {
        /// The source adapter that produced the error.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// The source yielded no records, so no index can be built.
    #[error("No documents available to index")]
    EmptyCorpus,

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The text generation provider failed.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vision-capable provider failed to analyze an image.
    #[error("Vision error ({provider}): {message}")]
    Vision {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A request parameter was invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No index has been published yet.
    #[error("Vector store is not available")]
    ServiceUnavailable,

    /// The query-time embedder differs from the one the index was built with.
    #[error("Embedding model mismatch: index built with '{index_model}', query embedded with '{query_model}'")]
    EmbeddingModelMismatch {
        /// Model id recorded in the index.
        index_model: String,
        /// Model id of the query-time embedder.
        query_model: String,
    },

    /// Feedback could not be persisted.
    #[error("Feedback error: {0}")]
    Feedback(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`RagError`], used to pick a reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DataSource,
    EmptyCorpus,
    Embedding,
    Generation,
    Vision,
    InvalidArgument,
    ServiceUnavailable,
    EmbeddingModelMismatch,
    Feedback,
    Config,
}

impl ErrorKind {
    /// Stable snake_case name, suitable for wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DataSource => "data_source_error",
            ErrorKind::EmptyCorpus => "empty_corpus",
            ErrorKind::Embedding => "embedding_service_error",
            ErrorKind::Generation => "generation_service_error",
            ErrorKind::Vision => "vision_service_error",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::EmbeddingModelMismatch => "embedding_model_mismatch",
            ErrorKind::Feedback => "feedback_error",
            ErrorKind::Config => "config_error",
        }
    }

    /// Whether the failure originated in an external provider or data store.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ErrorKind::DataSource | ErrorKind::Embedding | ErrorKind::Generation | ErrorKind::Vision
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RagError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::DataSource { .. } => ErrorKind::DataSource,
            RagError::EmptyCorpus => ErrorKind::EmptyCorpus,
            RagError::Embedding { .. } => ErrorKind::Embedding,
            RagError::Generation { .. } => ErrorKind::Generation,
            RagError::Vision { .. } => ErrorKind::Vision,
            RagError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RagError::ServiceUnavailable => ErrorKind::ServiceUnavailable,
            RagError::EmbeddingModelMismatch { .. } => ErrorKind::EmbeddingModelMismatch,
            RagError::Feedback(_) => ErrorKind::Feedback,
            RagError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn data_source(source_name: &str, message: impl Into<String>) -> Self {
        RagError::DataSource { source_name: source_name.to_string(), message: message.into() }
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        RagError::Embedding { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn generation(provider: &str, message: impl Into<String>) -> Self {
        RagError::Generation { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn vision(provider: &str, message: impl Into<String>) -> Self {
        RagError::Vision { provider: provider.to_string(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
