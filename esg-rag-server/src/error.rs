use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use esg_rag::{ErrorKind, RagError};
use serde_json::json;
use tracing::{error, warn};

/// A [`RagError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(RagError::InvalidArgument(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind())
    }
}

/// HTTP status reported for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::EmptyCorpus => StatusCode::NOT_FOUND,
        ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DataSource | ErrorKind::Embedding | ErrorKind::Generation | ErrorKind::Vision => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::EmbeddingModelMismatch | ErrorKind::Feedback | ErrorKind::Config => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.0.kind();
        if status.is_server_error() {
            error!(error_kind = %kind, error = %self.0, "request failed");
        } else {
            warn!(error_kind = %kind, error = %self.0, "request rejected");
        }

        let body = json!({ "error": kind.as_str(), "detail": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}
