//! Gemini embedding and generation providers over the Generative Language REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, ImageInput};

const PROVIDER: &str = "Gemini";

/// The default Generative Language API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Embedding dimensions of `text-embedding-004`.
const DEFAULT_DIMENSIONS: usize = 768;

fn http_client(timeout: Option<Duration>) -> std::result::Result<reqwest::Client, String> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| format!("failed to build HTTP client: {e}"))
}

/// Shared HTTP plumbing for both providers.
#[derive(Debug, Clone)]
struct GeminiApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiApi {
    fn new(api_key: String, timeout: Option<Duration>) -> std::result::Result<Self, String> {
        if api_key.is_empty() {
            return Err("API key must not be empty".to_string());
        }
        let client = http_client(timeout)?;
        Ok(Self { client, api_key, base_url: DEFAULT_BASE_URL.to_string() })
    }

    /// Swap in a client with `timeout`, keeping the key and base URL.
    fn set_timeout(&mut self, timeout: Duration) -> std::result::Result<(), String> {
        self.client = http_client(Some(timeout))?;
        Ok(())
    }

    fn url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{model}:{method}", self.base_url.trim_end_matches('/'))
    }

    /// POST `body` and decode the response, mapping every failure with `map`.
    async fn post<Req, Res>(&self, url: &str, body: &Req, map: impl Fn(String) -> RagError) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                map(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(map(format!("API returned {status}: {detail}")));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            map(format!("failed to parse response: {e}"))
        })
    }
}

fn api_key_from_env() -> std::result::Result<String, String> {
    std::env::var("GOOGLE_API_KEY")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .map_err(|_| "GOOGLE_API_KEY environment variable not set".to_string())
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedContentsRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GenerateContentResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> std::result::Result<String, String> {
        let candidate = self.candidates.into_iter().next().ok_or("response contained no candidates")?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            return Err(format!("response contained no text (finish reason: {reason})"));
        }
        Ok(text)
    }
}

// ── Embedding provider ─────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Queries ([`embed`](EmbeddingProvider::embed)) use the `RETRIEVAL_QUERY`
/// task type; index builds ([`embed_batch`](EmbeddingProvider::embed_batch))
/// use `RETRIEVAL_DOCUMENT`. Both go to the same model.
///
/// # Example
///
/// ```rust,ignore
/// use esg_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("Scope 1 emissions").await?;
/// ```
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingProvider {
    api: GeminiApi,
    model: String,
    dimensions: usize,
    output_dimensionality: Option<usize>,
}

impl GeminiEmbeddingProvider {
    /// Create a provider using the given API key and `text-embedding-004`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api = GeminiApi::new(api_key.into(), None).map_err(|m| RagError::embedding(PROVIDER, m))?;
        Ok(Self {
            api,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            output_dimensionality: None,
        })
    }

    /// Create a provider using `GOOGLE_API_KEY` (or `GEMINI_API_KEY`).
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().map_err(|m| RagError::embedding(PROVIDER, m))?;
        Self::new(api_key)
    }

    /// Set the embedding model. Dimensions must be set to match if it
    /// differs from 768.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the dimensionality reported for the model.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    /// Ask the API to truncate embeddings to `dims` entries.
    pub fn with_output_dimensionality(mut self, dims: usize) -> Self {
        self.output_dimensionality = Some(dims);
        self.dimensions = dims;
        self
    }

    /// Apply a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.api.set_timeout(timeout).map_err(|m| RagError::embedding(PROVIDER, m))?;
        Ok(self)
    }

    /// Point the provider at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }

    fn request<'a>(&self, text: &'a str, task_type: &'static str) -> EmbedContentRequest<'a> {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        EmbedContentRequest {
            model: format!("models/{model}"),
            content: Content { role: None, parts: vec![Part::Text { text }] },
            task_type,
            output_dimensionality: self.output_dimensionality,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let url = self.api.url(&self.model, "embedContent");
        let response: EmbedContentResponse = self
            .api
            .post(&url, &self.request(text, "RETRIEVAL_QUERY"), |m| RagError::embedding(PROVIDER, m))
            .await?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let body = BatchEmbedContentsRequest {
            requests: texts.iter().map(|t| self.request(t, "RETRIEVAL_DOCUMENT")).collect(),
        };
        let url = self.api.url(&self.model, "batchEmbedContents");
        let response: BatchEmbedContentsResponse =
            self.api.post(&url, &body, |m| RagError::embedding(PROVIDER, m)).await?;

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

// ── Generation provider ────────────────────────────────────────────

/// A [`GenerationProvider`] backed by Gemini `generateContent`.
///
/// Gemini models accept images inline, so the same provider serves both
/// answers and image insights.
#[derive(Debug, Clone)]
pub struct GeminiGenerationProvider {
    api: GeminiApi,
}

impl GeminiGenerationProvider {
    /// Create a provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api = GeminiApi::new(api_key.into(), None).map_err(|m| RagError::generation(PROVIDER, m))?;
        Ok(Self { api })
    }

    /// Create a provider using `GOOGLE_API_KEY` (or `GEMINI_API_KEY`).
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().map_err(|m| RagError::generation(PROVIDER, m))?;
        Self::new(api_key)
    }

    /// Apply a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.api.set_timeout(timeout).map_err(|m| RagError::generation(PROVIDER, m))?;
        Ok(self)
    }

    /// Point the provider at a different API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerationProvider {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        debug!(provider = PROVIDER, model, prompt_len = prompt.len(), "generating content");

        let body = GenerateContentRequest {
            contents: vec![Content { role: Some("user"), parts: vec![Part::Text { text: prompt }] }],
        };
        let url = self.api.url(model, "generateContent");
        let response: GenerateContentResponse =
            self.api.post(&url, &body, |m| RagError::generation(PROVIDER, m)).await?;
        response.into_text().map_err(|m| RagError::generation(PROVIDER, m))
    }

    async fn describe_image(&self, image: &ImageInput, prompt: &str, model: &str) -> Result<String> {
        debug!(provider = PROVIDER, model, mime_type = %image.mime_type, "describing image");

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![
                    Part::Text { text: prompt },
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: BASE64.encode(&image.bytes),
                        },
                    },
                ],
            }],
        };
        let url = self.api.url(model, "generateContent");
        let response: GenerateContentResponse = self.api.post(&url, &body, |m| RagError::vision(PROVIDER, m)).await?;
        response.into_text().map_err(|m| RagError::vision(PROVIDER, m))
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}
