//! Append-only storage for user ratings of generated answers.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// Highest accepted rating.
pub const MAX_RATING: f32 = 5.0;

/// A user's rating of a previously produced answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub question: String,
    #[serde(alias = "model_answer")]
    pub answer: String,
    pub rating: f32,
    #[serde(default, alias = "comments", skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Set by the server when the record is received.
    #[serde(skip_deserializing, default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Create a record stamped with the current time.
    pub fn new(question: impl Into<String>, answer: impl Into<String>, rating: f32, comment: Option<String>) -> Self {
        Self { question: question.into(), answer: answer.into(), rating, comment, submitted_at: Utc::now() }
    }

    /// Check the rating range and that question and answer are present.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if !self.rating.is_finite() || !(0.0..=MAX_RATING).contains(&self.rating) {
            return Err(RagError::InvalidArgument(format!(
                "rating must be between 0 and {MAX_RATING}, got {}",
                self.rating
            )));
        }
        if self.question.trim().is_empty() {
            return Err(RagError::InvalidArgument("feedback question must not be empty".to_string()));
        }
        if self.answer.trim().is_empty() {
            return Err(RagError::InvalidArgument("feedback answer must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Append-only feedback storage.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    /// Validate and append `record`.
    async fn record(&self, record: FeedbackRecord) -> Result<()>;
}

/// Keeps feedback in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryFeedbackSink {
    records: Mutex<Vec<FeedbackRecord>>,
}

impl InMemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records so far.
    pub async fn records(&self) -> Vec<FeedbackRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl FeedbackSink for InMemoryFeedbackSink {
    async fn record(&self, record: FeedbackRecord) -> Result<()> {
        record.validate()?;
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
///
/// Writes are serialized through a mutex so concurrent submissions never
/// interleave within a line.
#[derive(Debug)]
pub struct JsonlFeedbackSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlFeedbackSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }
}

#[async_trait]
impl FeedbackSink for JsonlFeedbackSink {
    async fn record(&self, record: FeedbackRecord) -> Result<()> {
        record.validate()?;

        let mut line = serde_json::to_string(&record)
            .map_err(|e| RagError::Feedback(format!("failed to serialize feedback: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RagError::Feedback(format!("failed to create '{}': {e}", parent.display())))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                error!(path = %self.path.display(), error = %e, "failed to open feedback file");
                RagError::Feedback(format!("failed to open '{}': {e}", self.path.display()))
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| RagError::Feedback(format!("failed to append feedback: {e}")))?;
        file.flush().await.map_err(|e| RagError::Feedback(format!("failed to flush feedback: {e}")))?;

        debug!(path = %self.path.display(), rating = record.rating, "recorded feedback");
        Ok(())
    }
}
