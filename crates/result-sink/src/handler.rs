//! The pluggable handler capability and output selection

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use session::{BoxFuture, EntityRecord};

use crate::csv::CsvHandler;
use crate::error::Result;
use crate::json::JsonArrayHandler;
use crate::jsonl::JsonLinesHandler;

/// Receives records from the sink consumer, one at a time.
///
/// Only the consumer task calls into a handler, so methods take `&mut self`
/// and need no internal locking. `flush` is called once, after the last
/// `handle`.
pub trait ResultHandler: Send {
    fn handle<'a>(&'a mut self, record: &'a EntityRecord) -> BoxFuture<'a, Result<()>>;

    fn flush(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// On-disk output encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Jsonl,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Json => "json",
        })
    }
}

/// Create (truncating) the output file and return its handler.
pub async fn create_handler(format: OutputFormat, path: &Path) -> Result<Box<dyn ResultHandler>> {
    Ok(match format {
        OutputFormat::Csv => Box::new(CsvHandler::create(path).await?),
        OutputFormat::Jsonl => Box::new(JsonLinesHandler::create(path).await?),
        OutputFormat::Json => Box::new(JsonArrayHandler::create(path).await?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Output {
        #[serde(default)]
        format: OutputFormat,
    }

    #[test]
    fn format_names_deserialize_lowercase() {
        let out: Output = toml_like(r#"{"format": "jsonl"}"#);
        assert_eq!(out.format, OutputFormat::Jsonl);
        let out: Output = toml_like("{}");
        assert_eq!(out.format, OutputFormat::Csv);
        assert!(serde_json::from_str::<Output>(r#"{"format": "xml"}"#).is_err());
    }

    fn toml_like(json: &str) -> Output {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn create_handler_truncates_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        tokio::fs::write(&path, "stale\n").await.unwrap();

        let mut handler = create_handler(OutputFormat::Jsonl, &path).await.unwrap();
        handler.flush().await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "");
    }

    #[tokio::test]
    async fn create_handler_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/out.csv");
        assert!(create_handler(OutputFormat::Csv, &path).await.is_err());
    }
}
