//! Retrieval-augmented question answering over ESG report data.
//!
//! `esg-rag` pulls rows from a [`DocumentSource`], embeds them into an
//! in-memory [`VectorIndex`] published through an [`IndexHandle`], and
//! answers questions with a [`GenerationProvider`] grounded on the retrieved
//! passages. [`RagService`] wires the pieces together and adds image insights
//! and feedback capture.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use esg_rag::{JsonlSource, QueryRequest, RagConfig, RagService, TableSchema};
//! use esg_rag::gemini::{GeminiEmbeddingProvider, GeminiGenerationProvider};
//!
//! let service = RagService::builder()
//!     .config(RagConfig::default())
//!     .source(Arc::new(JsonlSource::new("esg.jsonl", TableSchema::new(["text"]))))
//!     .embedding_provider(Arc::new(GeminiEmbeddingProvider::from_env()?))
//!     .generation_provider(Arc::new(GeminiGenerationProvider::from_env()?))
//!     .build()?;
//! service.refresh().await?;
//! let answer = service.answer(&QueryRequest::new("How did Scope 1 emissions change?")).await?;
//! ```

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod generation;
pub mod generator;
pub mod index;
pub mod language;
pub mod mock;
pub mod retriever;
pub mod service;
pub mod source;
pub mod vision;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use config::{DEFAULT_TOP_K, RagConfig, RagConfigBuilder};
pub use document::{DocumentRecord, IndexedChunk, Metadata, MetadataValue, ScoredResult};
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, RagError, Result};
pub use feedback::{FeedbackRecord, FeedbackSink, InMemoryFeedbackSink, JsonlFeedbackSink, MAX_RATING};
pub use generation::{GenerationProvider, ImageInput};
pub use generator::{AnswerGenerator, GeneratedAnswer};
pub use index::{IndexHandle, VectorIndex, cosine_similarity};
pub use language::ResponseLanguage;
pub use retriever::{Retriever, validate_top_k};
pub use service::{AnswerResponse, HealthStatus, Query, QueryRequest, RagService, RagServiceBuilder, RefreshReport};
pub use source::{DocumentSource, JsonlSource, Row, StaticSource, TableSchema, row_from_json};
pub use vision::{ImageInsightExtractor, TempUpload, clean_upload_dir};
