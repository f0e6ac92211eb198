//! Command-line and environment configuration for the server.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use esg_rag::{RagConfig, TableSchema};

/// Which model backend serves embeddings and generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Gemini REST API (requires `GOOGLE_API_KEY`).
    Gemini,
    /// OpenAI REST API (requires `OPENAI_API_KEY`).
    Openai,
    /// Deterministic local providers; no network access.
    Offline,
}

/// ESG RAG HTTP server
#[derive(Parser, Debug, Clone)]
#[command(name = "esg-rag-server")]
#[command(about = "Retrieval-augmented question answering over ESG data", long_about = None)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "ESG_RAG_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "ESG_RAG_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Model backend
    #[arg(long, env = "ESG_RAG_PROVIDER", value_enum, default_value = "gemini")]
    pub provider: ProviderKind,

    /// Embedding model; the backend's default when unset
    #[arg(long, env = "ESG_RAG_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Embedding dimensions requested from the backend
    #[arg(long, env = "ESG_RAG_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Default model for answers
    #[arg(long, env = "ESG_RAG_GENERATION_MODEL", default_value = "gemini-2.5-flash")]
    pub generation_model: String,

    /// Vision-capable model for image insights
    #[arg(long, env = "ESG_RAG_VISION_MODEL", default_value = "gemini-2.5-flash")]
    pub vision_model: String,

    /// Results returned when a query does not set top_k
    #[arg(long, env = "ESG_RAG_TOP_K", default_value_t = esg_rag::DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Newline-delimited JSON export of the ESG table
    #[arg(long, env = "ESG_RAG_DOCUMENTS")]
    pub documents: Option<PathBuf>,

    /// PostgreSQL connection string; takes precedence over --documents
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Table read when --database-url is set
    #[arg(long, env = "ESG_RAG_TABLE", default_value = "esg_data")]
    pub table: String,

    /// Columns rendered into each record's text
    #[arg(long, env = "ESG_RAG_CONTENT_COLUMNS", value_delimiter = ',', default_value = "text")]
    pub content_columns: Vec<String>,

    /// Columns kept as metadata; every other column when empty
    #[arg(long, env = "ESG_RAG_METADATA_COLUMNS", value_delimiter = ',')]
    pub metadata_columns: Vec<String>,

    /// Directory for temporary image uploads
    #[arg(long, env = "ESG_RAG_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// File receiving feedback as JSON lines (ignored with --database-url)
    #[arg(long, env = "ESG_RAG_FEEDBACK_PATH", default_value = "feedback.jsonl")]
    pub feedback_path: PathBuf,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "ESG_RAG_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Per-request timeout for model providers, in seconds
    #[arg(long, env = "ESG_RAG_PROVIDER_TIMEOUT_SECS", default_value_t = 60)]
    pub provider_timeout_secs: u64,
}

impl ServerConfig {
    /// The `host:port` pair to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn table_schema(&self) -> TableSchema {
        TableSchema::new(self.content_columns.iter().cloned())
            .with_metadata_columns(self.metadata_columns.iter().cloned())
    }

    /// Core service configuration derived from the flags.
    pub fn rag_config(&self) -> esg_rag::Result<RagConfig> {
        RagConfig::builder()
            .default_top_k(self.top_k)
            .generation_model(&self.generation_model)
            .vision_model(&self.vision_model)
            .upload_dir(&self.upload_dir)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_service() {
        let config = ServerConfig::try_parse_from(["esg-rag-server"]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.content_columns, ["text"]);
        assert!(config.metadata_columns.is_empty());
        assert_eq!(config.rag_config().unwrap().default_top_k, 3);
    }

    #[test]
    fn parses_column_lists_and_provider() {
        let config = ServerConfig::try_parse_from([
            "esg-rag-server",
            "--provider",
            "offline",
            "--content-columns",
            "company,indicator,value",
            "--metadata-columns",
            "year",
            "--top-k",
            "5",
        ])
        .unwrap();

        assert_eq!(config.provider, ProviderKind::Offline);
        assert_eq!(config.table_schema().content_columns(), ["company", "indicator", "value"]);
        assert_eq!(config.rag_config().unwrap().default_top_k, 5);
    }

    #[test]
    fn zero_top_k_is_a_config_error() {
        let config = ServerConfig::try_parse_from(["esg-rag-server", "--top-k", "0"]).unwrap();
        assert!(config.rag_config().is_err());
    }
}
