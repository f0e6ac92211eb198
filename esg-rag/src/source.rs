//! Document sources: adapters that pull tabular rows from a data store and
//! normalize them into [`DocumentRecord`]s.
//!
//! - [`StaticSource`]: records held in memory
//! - [`JsonlSource`]: newline-delimited JSON rows (a table export)
//! - `PgSource`: a PostgreSQL table (feature `postgres`, see the `postgres` module)

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::document::{DocumentRecord, Metadata, MetadataValue};
use crate::error::{RagError, Result};

/// A single source row: column name to scalar cell value.
pub type Row = BTreeMap<String, MetadataValue>;

/// A source of records to index.
///
/// An empty result is not an error here; the index layer reports it as
/// [`RagError::EmptyCorpus`].
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch every record currently available.
    async fn fetch(&self) -> Result<Vec<DocumentRecord>>;

    /// Human-readable source name used in errors and logs.
    fn name(&self) -> &str;
}

/// Describes how table rows map onto record content and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    content_columns: Vec<String>,
    metadata_columns: Vec<String>,
}

impl TableSchema {
    /// Create a schema rendering `content_columns` (in order) into the record text.
    ///
    /// Every other column becomes metadata unless
    /// [`with_metadata_columns`](Self::with_metadata_columns) narrows it.
    pub fn new<I, S>(content_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            content_columns: content_columns.into_iter().map(Into::into).collect(),
            metadata_columns: Vec::new(),
        }
    }

    /// Restrict metadata to the given columns.
    pub fn with_metadata_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Columns rendered into the record content.
    pub fn content_columns(&self) -> &[String] {
        &self.content_columns
    }

    /// Normalize one row into a record.
    ///
    /// Returns `Ok(None)` when the rendered content is blank.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DataSource`] if the schema has no content columns
    /// or a content column is absent from the row.
    pub fn normalize(&self, source_name: &str, row: &Row) -> Result<Option<DocumentRecord>> {
        if self.content_columns.is_empty() {
            return Err(RagError::data_source(source_name, "schema has no content columns"));
        }

        let mut parts = Vec::with_capacity(self.content_columns.len());
        for column in &self.content_columns {
            let value = row.get(column).ok_or_else(|| {
                RagError::data_source(source_name, format!("row is missing content column '{column}'"))
            })?;
            let text = value.to_string();
            if text.trim().is_empty() {
                continue;
            }
            if self.content_columns.len() == 1 {
                parts.push(text);
            } else {
                parts.push(format!("{column}: {text}"));
            }
        }

        if parts.is_empty() {
            return Ok(None);
        }

        let metadata: Metadata = if self.metadata_columns.is_empty() {
            row.iter()
                .filter(|(column, _)| !self.content_columns.contains(column))
                .map(|(column, value)| (column.clone(), value.clone()))
                .collect()
        } else {
            self.metadata_columns
                .iter()
                .filter_map(|column| row.get(column).map(|value| (column.clone(), value.clone())))
                .collect()
        };

        Ok(Some(DocumentRecord { content: parts.join("\n"), metadata }))
    }

    /// Normalize a batch of rows, skipping blank ones.
    pub fn normalize_rows(&self, source_name: &str, rows: &[Row]) -> Result<Vec<DocumentRecord>> {
        let mut records = Vec::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            match self.normalize(source_name, row)? {
                Some(record) => records.push(record),
                None => warn!(source = source_name, position, "skipping row with blank content"),
            }
        }
        Ok(records)
    }
}

/// Convert a JSON object into a [`Row`]. Null cells are dropped.
///
/// # Errors
///
/// Returns [`RagError::DataSource`] if the value is not an object or holds
/// nested arrays/objects.
pub fn row_from_json(source_name: &str, value: serde_json::Value) -> Result<Row> {
    let serde_json::Value::Object(map) = value else {
        return Err(RagError::data_source(source_name, "expected each row to be a JSON object"));
    };

    let mut row = Row::new();
    for (column, cell) in map {
        if cell.is_null() {
            continue;
        }
        let value = MetadataValue::from_json(&cell).ok_or_else(|| {
            RagError::data_source(source_name, format!("column '{column}' holds a non-scalar value"))
        })?;
        row.insert(column, value);
    }
    Ok(row)
}

/// A source serving a fixed set of records from memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    records: Vec<DocumentRecord>,
}

impl StaticSource {
    /// Create a source that always returns `records`.
    pub fn new(records: Vec<DocumentRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<DocumentRecord>> {
        Ok(self.records.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// A source reading newline-delimited JSON rows from a file.
///
/// The file is re-read on every [`fetch`](DocumentSource::fetch), so a
/// refresh picks up a newly exported table.
#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
    schema: TableSchema,
}

impl JsonlSource {
    /// Create a source for the file at `path`.
    pub fn new(path: impl Into<PathBuf>, schema: TableSchema) -> Self {
        Self { path: path.into(), schema }
    }
}

#[async_trait]
impl DocumentSource for JsonlSource {
    async fn fetch(&self) -> Result<Vec<DocumentRecord>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RagError::data_source(self.name(), format!("failed to read '{}': {e}", self.path.display()))
        })?;

        let mut rows = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                RagError::data_source(self.name(), format!("line {}: invalid JSON: {e}", line_no + 1))
            })?;
            rows.push(row_from_json(self.name(), value)?);
        }

        let records = self.schema.normalize_rows(self.name(), &rows)?;
        debug!(path = %self.path.display(), row_count = rows.len(), record_count = records.len(), "fetched rows");
        Ok(records)
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: serde_json::Value) -> Row {
        row_from_json("test", value).unwrap()
    }

    #[test]
    fn single_content_column_renders_bare_value() {
        let schema = TableSchema::new(["text"]);
        let record = schema
            .normalize("test", &row(json!({"text": "Scope 1 emissions fell 10%", "doc": "A"})))
            .unwrap()
            .unwrap();

        assert_eq!(record.content, "Scope 1 emissions fell 10%");
        assert_eq!(record.metadata["doc"], MetadataValue::Text("A".into()));
        assert!(!record.metadata.contains_key("text"));
    }

    #[test]
    fn multiple_content_columns_render_labelled_lines() {
        let schema = TableSchema::new(["company", "indicator", "value"]).with_metadata_columns(["year"]);
        let record = schema
            .normalize(
                "test",
                &row(json!({"company": "Acme", "indicator": "water use", "value": 12.5, "year": 2023, "id": 9})),
            )
            .unwrap()
            .unwrap();

        assert_eq!(record.content, "company: Acme\nindicator: water use\nvalue: 12.5");
        assert_eq!(record.metadata.len(), 1);
        assert_eq!(record.metadata["year"], MetadataValue::Integer(2023));
    }

    #[test]
    fn missing_content_column_is_a_schema_error() {
        let schema = TableSchema::new(["text"]);
        let err = schema.normalize("test", &row(json!({"body": "x"}))).unwrap_err();
        assert!(matches!(err, RagError::DataSource { .. }));
    }

    #[test]
    fn blank_rows_are_skipped() {
        let schema = TableSchema::new(["text"]);
        let records = schema
            .normalize_rows("test", &[row(json!({"text": "  "})), row(json!({"text": "kept"}))])
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "kept");
    }

    #[test]
    fn nested_cells_are_rejected() {
        let err = row_from_json("test", json!({"text": "x", "tags": ["a"]})).unwrap_err();
        assert!(matches!(err, RagError::DataSource { .. }));
        assert!(row_from_json("test", json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn jsonl_source_reads_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("esg.jsonl");
        tokio::fs::write(
            &path,
            "{\"text\": \"Scope 1 emissions fell 10%\", \"doc\": \"A\"}\n\n{\"text\": \"Board diversity rose\", \"doc\": \"B\", \"page\": null}\n",
        )
        .await
        .unwrap();

        let source = JsonlSource::new(&path, TableSchema::new(["text"]));
        let records = source.fetch().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content, "Board diversity rose");
        assert!(!records[1].metadata.contains_key("page"));
    }

    #[tokio::test]
    async fn jsonl_source_reports_bad_lines_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        tokio::fs::write(&path, "{\"text\": \"ok\"}\nnot json\n").await.unwrap();

        let err = JsonlSource::new(&path, TableSchema::new(["text"])).fetch().await.unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let missing = JsonlSource::new(dir.path().join("nope.jsonl"), TableSchema::new(["text"]));
        assert!(matches!(missing.fetch().await, Err(RagError::DataSource { .. })));
    }

    #[tokio::test]
    async fn static_source_returns_its_records() {
        let source = StaticSource::new(vec![DocumentRecord::new("a"), DocumentRecord::new("b")]);
        assert_eq!(source.fetch().await.unwrap().len(), 2);
    }
}
