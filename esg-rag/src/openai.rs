//! OpenAI embedding and chat-completion providers.
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, ImageInput};

const PROVIDER: &str = "OpenAI";

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

fn client_with_timeout(timeout: Duration) -> std::result::Result<reqwest::Client, String> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|e| format!("failed to build HTTP client: {e}"))
}

fn api_key_from_env() -> std::result::Result<String, String> {
    std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY environment variable not set".to_string())
}

/// POST a JSON body with bearer auth and decode the response.
async fn post_json<Req, Res>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &Req,
    map: impl Fn(String) -> RagError,
) -> Result<Res>
where
    Req: Serialize + ?Sized,
    Res: for<'de> Deserialize<'de>,
{
    let response = client.post(url).bearer_auth(api_key).json(body).send().await.map_err(|e| {
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

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use esg_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("water withdrawal intensity").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::embedding(PROVIDER, "API key must not be empty"));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().map_err(|m| RagError::embedding(PROVIDER, m))?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions. The API truncates embeddings to this size.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Use an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Apply a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = client_with_timeout(timeout).map_err(|m| RagError::embedding(PROVIDER, m))?;
        Ok(self)
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ChatResponse {
    fn into_text(self) -> std::result::Result<String, String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| "response contained no message content".to_string())
    }
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body =
            EmbeddingRequest { model: &self.model, input: texts.to_vec(), dimensions: self.request_dimensions };
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let mut response: EmbeddingResponse =
            post_json(&self.client, &url, &self.api_key, &request_body, |m| RagError::embedding(PROVIDER, m))
                .await?;

        // Entries carry their input position; keep input order regardless of response order.
        response.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
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

// ── GenerationProvider implementation ──────────────────────────────

/// A [`GenerationProvider`] backed by the chat completions API.
///
/// Images are sent as base64 `data:` URLs, so the model named at call time
/// must be vision-capable for [`describe_image`](GenerationProvider::describe_image).
pub struct OpenAIGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIGenerationProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::generation(PROVIDER, "API key must not be empty"));
        }
        Ok(Self { client: reqwest::Client::new(), api_key, base_url: OPENAI_BASE_URL.into() })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().map_err(|m| RagError::generation(PROVIDER, m))?;
        Self::new(api_key)
    }

    /// Use an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Apply a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = client_with_timeout(timeout).map_err(|m| RagError::generation(PROVIDER, m))?;
        Ok(self)
    }

    async fn chat(&self, model: &str, content: Value, map: impl Fn(String) -> RagError) -> Result<String> {
        let body = ChatRequest { model, messages: vec![ChatMessage { role: "user", content }] };
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response: ChatResponse = post_json(&self.client, &url, &self.api_key, &body, &map).await?;
        response.into_text().map_err(map)
    }
}

fn image_content(image: &ImageInput, prompt: &str) -> Value {
    let data_url = format!("data:{};base64,{}", image.mime_type, BASE64.encode(&image.bytes));
    json!([
        {"type": "text", "text": prompt},
        {"type": "image_url", "image_url": {"url": data_url}}
    ])
}

#[async_trait]
impl GenerationProvider for OpenAIGenerationProvider {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        debug!(provider = PROVIDER, model, prompt_len = prompt.len(), "chat completion");
        self.chat(model, Value::String(prompt.to_string()), |m| RagError::generation(PROVIDER, m)).await
    }

    async fn describe_image(&self, image: &ImageInput, prompt: &str, model: &str) -> Result<String> {
        debug!(provider = PROVIDER, model, mime_type = %image.mime_type, "describing image");
        self.chat(model, image_content(image, prompt), |m| RagError::vision(PROVIDER, m)).await
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}
