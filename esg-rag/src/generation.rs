//! Generation provider trait for text and vision completions.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// An image payload handed to a vision-capable model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    /// Raw encoded image bytes (PNG, JPEG, ...).
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`, e.g. `image/png`.
    pub mime_type: String,
}

impl ImageInput {
    /// Wrap raw bytes, validating that the payload is a non-empty image.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] for empty payloads or non-image
    /// MIME types.
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Result<Self> {
        let mime_type = mime_type.into();
        if bytes.is_empty() {
            return Err(RagError::InvalidArgument("image payload is empty".to_string()));
        }
        if !mime_type.starts_with("image/") {
            return Err(RagError::InvalidArgument(format!(
                "unsupported content type '{mime_type}', expected an image"
            )));
        }
        Ok(Self { bytes, mime_type })
    }

    /// Read an image from disk, guessing its MIME type from the extension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if the file cannot be read or is
    /// not an image.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let mime_type = mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RagError::InvalidArgument(format!("failed to read image '{}': {e}", path.display()))
        })?;
        Self::new(bytes, mime_type)
    }
}

/// A generative model backend.
///
/// `complete` answers text prompts; `describe_image` runs a prompt against an
/// image with a vision-capable model. Providers without vision support keep
/// the default, which fails with [`RagError::Vision`].
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Run a single text completion with the given model.
    async fn complete(&self, prompt: &str, model: &str) -> Result<String>;

    /// Run a prompt against an image with a vision-capable model.
    async fn describe_image(&self, _image: &ImageInput, _prompt: &str, model: &str) -> Result<String> {
        Err(RagError::vision(self.provider_name(), format!("model '{model}' does not accept images")))
    }

    /// Human-readable provider name used in errors and logs.
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_non_image_payloads() {
        assert!(matches!(ImageInput::new(vec![], "image/png"), Err(RagError::InvalidArgument(_))));
        assert!(matches!(
            ImageInput::new(vec![1, 2, 3], "application/pdf"),
            Err(RagError::InvalidArgument(_))
        ));
        assert!(ImageInput::new(vec![1, 2, 3], "image/jpeg").is_ok());
    }

    #[tokio::test]
    async fn from_path_guesses_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        tokio::fs::write(&path, [0x89, 0x50, 0x4e, 0x47]).await.unwrap();

        let image = ImageInput::from_path(&path).await.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.bytes.len(), 4);
    }

    #[tokio::test]
    async fn from_path_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageInput::from_path(&dir.path().join("missing.jpg")).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }
}
