//! Image insight extraction. Independent of the index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, ImageInput};

const INSIGHT_PROMPT: &str = "You are an ESG analyst. Analyze this infographic or chart from an ESG report.
Describe:
1. The main topic and the ESG pillar it belongs to (environmental, social or governance).
2. Every key figure, trend and time period shown, quoted exactly.
3. Any targets, commitments or comparisons against prior periods.
4. Notable gaps, caveats or data that appears to be missing.
Answer in concise paragraphs.";

/// Runs a fixed ESG analysis prompt against an image with a vision-capable model.
#[derive(Clone)]
pub struct ImageInsightExtractor {
    provider: Arc<dyn GenerationProvider>,
    model: String,
    prompt: String,
}

impl ImageInsightExtractor {
    /// Create an extractor calling `model` through `provider`.
    pub fn new(provider: Arc<dyn GenerationProvider>, model: impl Into<String>) -> Self {
        Self { provider, model: model.into(), prompt: INSIGHT_PROMPT.to_string() }
    }

    /// Replace the analysis prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// The vision model used.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Extract a free-form insight narrative from `image`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Vision`] if the provider fails or returns nothing.
    pub async fn analyze(&self, image: &ImageInput) -> Result<String> {
        let provider = self.provider.provider_name();
        debug!(provider, model = %self.model, mime_type = %image.mime_type, size = image.bytes.len(), "analyzing image");

        let insights = self.provider.describe_image(image, &self.prompt, &self.model).await.map_err(|e| {
            error!(provider, model = %self.model, error = %e, "image analysis failed");
            match e {
                RagError::Vision { .. } => e,
                other => RagError::vision(provider, other.to_string()),
            }
        })?;

        if insights.trim().is_empty() {
            return Err(RagError::vision(provider, format!("model '{}' returned no insights", self.model)));
        }

        info!(provider, model = %self.model, insights_len = insights.len(), "extracted image insights");
        Ok(insights)
    }

    /// Read the image at `path` and analyze it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if the file is unreadable or not
    /// an image, and [`RagError::Vision`] on provider failure.
    pub async fn analyze_path(&self, path: &Path) -> Result<String> {
        let image = ImageInput::from_path(path).await?;
        self.analyze(&image).await
    }

    /// Stage `bytes` in a [`TempUpload`] under `upload_dir`, analyze it, and
    /// remove the file again whatever the outcome.
    pub async fn analyze_upload(&self, upload_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<String> {
        let upload = TempUpload::create(upload_dir, file_name, bytes).await?;
        self.analyze_path(upload.path()).await
    }
}

/// A per-request temporary file, removed when dropped.
///
/// Files are named `{uuid}{.ext}`, keeping the original extension so the MIME
/// type can be guessed; concurrent uploads never collide.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    /// Write `bytes` to a fresh file in `dir`, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for empty uploads and
    /// [`RagError::Vision`] if the file cannot be written.
    pub async fn create(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(RagError::InvalidArgument("uploaded file is empty".to_string()));
        }

        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_default();
        let path = dir.join(format!("{}{extension}", Uuid::new_v4()));

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RagError::vision("upload", format!("failed to create '{}': {e}", dir.display())))?;
        // Constructed before the write so a partial file is still removed.
        let upload = Self { path };
        tokio::fs::write(&upload.path, bytes)
            .await
            .map_err(|e| RagError::vision("upload", format!("failed to write '{}': {e}", upload.path.display())))?;

        debug!(path = %upload.path.display(), size = bytes.len(), "staged upload");
        Ok(upload)
    }

    /// Location of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove upload"),
        }
    }
}

/// Remove every regular file left in `dir`. Returns how many were removed.
///
/// Used at shutdown; a missing directory counts as already clean.
pub async fn clean_upload_dir(dir: &Path) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to read upload directory");
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list upload directory");
                break;
            }
        };
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to delete upload"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{EchoGenerationProvider, FailingGenerationProvider};

    #[tokio::test]
    async fn analyze_upload_cleans_up_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(EchoGenerationProvider::new());
        let extractor = ImageInsightExtractor::new(provider.clone(), "gemini-2.5-flash");

        let insights = extractor.analyze_upload(dir.path(), "chart.PNG", &[1, 2, 3]).await.unwrap();

        assert!(insights.contains("image/png"));
        assert_eq!(provider.calls()[0].model, "gemini-2.5-flash");
        assert!(provider.calls()[0].prompt.contains("ESG"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn analyze_upload_cleans_up_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = ImageInsightExtractor::new(Arc::new(FailingGenerationProvider), "vision");

        let err = extractor.analyze_upload(dir.path(), "chart.jpg", &[1, 2, 3]).await.unwrap_err();

        assert!(matches!(err, RagError::Vision { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = ImageInsightExtractor::new(Arc::new(EchoGenerationProvider::new()), "vision");

        let err = extractor.analyze_upload(dir.path(), "report.pdf", b"%PDF").await.unwrap_err();

        assert!(matches!(err, RagError::InvalidArgument(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn concurrent_uploads_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempUpload::create(dir.path(), "x.png", &[1]).await.unwrap();
        let b = TempUpload::create(dir.path(), "x.png", &[2]).await.unwrap();

        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().extension().unwrap(), "png");
        drop(a);
        drop(b);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn clean_upload_dir_removes_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), [1]).unwrap();
        std::fs::write(dir.path().join("b.jpg"), [1]).unwrap();

        assert_eq!(clean_upload_dir(dir.path()).await, 2);
        assert_eq!(clean_upload_dir(&dir.path().join("missing")).await, 0);
    }
}
