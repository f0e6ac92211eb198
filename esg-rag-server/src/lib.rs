//! `esg-rag-server` exposes the `esg-rag` engine over HTTP.
//! It loads the index at startup and serves queries, refreshes, image
//! insights and feedback as JSON.

pub mod config;
pub mod error;
pub mod server;

pub use config::{ProviderKind, ServerConfig};
pub use error::ApiError;
pub use server::{AppState, app_router, build_service, run_server};
