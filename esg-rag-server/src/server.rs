use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use esg_rag::mock::{EchoGenerationProvider, HashingEmbeddingProvider};
use esg_rag::{
    AnswerResponse, DocumentSource, EmbeddingProvider, FeedbackRecord, FeedbackSink, GenerationProvider,
    JsonlFeedbackSink, JsonlSource, QueryRequest, RagService, clean_upload_dir,
};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{ProviderKind, ServerConfig};
use crate::error::ApiError;

/// Default request body limit when none is configured.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Dimensions of the offline hashing embedder when none are configured.
const OFFLINE_DIMENSIONS: usize = 384;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RagService>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service, max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }

    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    Router::new()
        .route("/health", get(health))
        .route("/refresh", post(refresh))
        .route("/query", post(query))
        .route("/similar-documents", post(similar_documents))
        .route("/analyze-image", post(analyze_image))
        .route("/submit-feedback", post(submit_feedback))
        .with_state(state)
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the service, load the index, and serve until Ctrl-C.
///
/// Leftover uploads are removed once the server has stopped.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let service = Arc::new(build_service(&config).await?);
    if !service.load().await {
        warn!("serving without an index; POST /refresh once data is available");
    }

    let addr: SocketAddr =
        config.bind_address().parse().with_context(|| "invalid host/port for esg-rag-server")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("esg-rag-server listening on http://{}", addr);

    let state = AppState::new(service.clone()).with_max_body_bytes(config.max_upload_bytes);
    axum::serve(listener, app_router(state)).with_graceful_shutdown(shutdown_signal()).await?;

    let removed = clean_upload_dir(service.upload_dir()).await;
    info!(removed, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// Assemble a [`RagService`] from the server configuration.
pub async fn build_service(config: &ServerConfig) -> anyhow::Result<RagService> {
    let rag_config = config.rag_config()?;
    let (embedder, generator) = providers(config)?;
    let source = document_source(config).await?;
    let feedback = feedback_sink(config).await?;

    info!(
        provider = ?config.provider,
        source = source.name(),
        embedding_model = embedder.model_id(),
        generation_model = %rag_config.generation_model,
        "service configured"
    );

    Ok(RagService::builder()
        .config(rag_config)
        .source(source)
        .embedding_provider(embedder)
        .generation_provider(generator)
        .feedback_sink(feedback)
        .build()?)
}

type Providers = (Arc<dyn EmbeddingProvider>, Arc<dyn GenerationProvider>);

fn providers(config: &ServerConfig) -> anyhow::Result<Providers> {
    match config.provider {
        ProviderKind::Gemini => gemini_providers(config),
        ProviderKind::Openai => openai_providers(config),
        ProviderKind::Offline => {
            warn!("offline providers echo prompts instead of generating answers");
            let dims = config.embedding_dimensions.unwrap_or(OFFLINE_DIMENSIONS);
            let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(dims));
            let generator: Arc<dyn GenerationProvider> = Arc::new(EchoGenerationProvider::new());
            Ok((embedder, generator))
        }
    }
}

#[cfg(feature = "gemini")]
fn gemini_providers(config: &ServerConfig) -> anyhow::Result<Providers> {
    use esg_rag::gemini::{GeminiEmbeddingProvider, GeminiGenerationProvider};

    let mut embedder = GeminiEmbeddingProvider::from_env()?.with_timeout(config.provider_timeout())?;
    if let Some(model) = &config.embedding_model {
        embedder = embedder.with_model(model);
    }
    if let Some(dims) = config.embedding_dimensions {
        embedder = embedder.with_output_dimensionality(dims);
    }
    let generator = GeminiGenerationProvider::from_env()?.with_timeout(config.provider_timeout())?;
    let providers: Providers = (Arc::new(embedder), Arc::new(generator));
    Ok(providers)
}

#[cfg(not(feature = "gemini"))]
fn gemini_providers(_config: &ServerConfig) -> anyhow::Result<Providers> {
    anyhow::bail!("esg-rag-server was built without the `gemini` feature")
}

#[cfg(feature = "openai")]
fn openai_providers(config: &ServerConfig) -> anyhow::Result<Providers> {
    use esg_rag::openai::{OpenAIEmbeddingProvider, OpenAIGenerationProvider};

    let mut embedder = OpenAIEmbeddingProvider::from_env()?.with_timeout(config.provider_timeout())?;
    if let Some(model) = &config.embedding_model {
        embedder = embedder.with_model(model);
    }
    if let Some(dims) = config.embedding_dimensions {
        embedder = embedder.with_dimensions(dims);
    }
    let generator = OpenAIGenerationProvider::from_env()?.with_timeout(config.provider_timeout())?;
    let providers: Providers = (Arc::new(embedder), Arc::new(generator));
    Ok(providers)
}

#[cfg(not(feature = "openai"))]
fn openai_providers(_config: &ServerConfig) -> anyhow::Result<Providers> {
    anyhow::bail!("esg-rag-server was built without the `openai` feature")
}

async fn document_source(config: &ServerConfig) -> anyhow::Result<Arc<dyn DocumentSource>> {
    if let Some(url) = &config.database_url {
        return postgres_source(url, config).await;
    }
    let path = config
        .documents
        .as_ref()
        .context("no document source configured; pass --documents or --database-url")?;
    Ok(Arc::new(JsonlSource::new(path, config.table_schema())))
}

#[cfg(feature = "postgres")]
async fn postgres_source(url: &str, config: &ServerConfig) -> anyhow::Result<Arc<dyn DocumentSource>> {
    let source = esg_rag::postgres::PgSource::connect(url, &config.table, config.table_schema()).await?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "postgres"))]
async fn postgres_source(_url: &str, _config: &ServerConfig) -> anyhow::Result<Arc<dyn DocumentSource>> {
    anyhow::bail!("--database-url requires the `postgres` feature")
}

#[cfg(feature = "postgres")]
async fn feedback_sink(config: &ServerConfig) -> anyhow::Result<Arc<dyn FeedbackSink>> {
    use esg_rag::postgres::{DEFAULT_FEEDBACK_TABLE, PgFeedbackSink};

    match &config.database_url {
        Some(url) => Ok(Arc::new(PgFeedbackSink::connect(url, DEFAULT_FEEDBACK_TABLE).await?)),
        None => Ok(Arc::new(JsonlFeedbackSink::new(&config.feedback_path))),
    }
}

#[cfg(not(feature = "postgres"))]
async fn feedback_sink(config: &ServerConfig) -> anyhow::Result<Arc<dyn FeedbackSink>> {
    Ok(Arc::new(JsonlFeedbackSink::new(&config.feedback_path)))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let health = state.service.health().await;
    Json(json!({
        "status": "healthy",
        "vector_store_loaded": health.index_loaded,
        "document_count": health.document_count,
        "embedding_model": health.embedding_model,
    }))
}

async fn refresh(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state.service.refresh().await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Vector store refreshed successfully",
        "document_count": report.document_count,
    })))
}

async fn query(
    State(state): State<AppState>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(state.service.answer(&request).await?))
}

async fn similar_documents(
    State(state): State<AppState>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let documents = state.service.similar_documents(&request).await?;
    Ok(Json(json!({ "status": "success", "documents": documents })))
}

async fn analyze_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::bad_request(e.body_text()))? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(|e| ApiError::bad_request(e.body_text()))?;

        let insights = state.service.analyze_upload(&file_name, &bytes).await?;
        return Ok(Json(json!({ "insights": insights })));
    }
    Err(ApiError::bad_request("multipart field 'file' is required"))
}

async fn submit_feedback(
    State(state): State<AppState>,
    record: Result<Json<FeedbackRecord>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(record) = record.map_err(|e| ApiError::bad_request(e.body_text()))?;
    state.service.submit_feedback(record).await?;
    Ok(Json(json!({ "status": "success", "message": "Feedback submitted successfully" })))
}
