//! CSV output
//!
//! Header row is the entity field names, written before the first record.
//! Fields are quoted per RFC 4180 only when they need it.

use std::path::Path;

use session::{BoxFuture, EntityRecord};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;
use crate::handler::ResultHandler;

pub struct CsvHandler {
    writer: BufWriter<File>,
    header_written: bool,
}

impl CsvHandler {
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            writer: BufWriter::new(file),
            header_written: false,
        })
    }

    async fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        let line = fields
            .iter()
            .map(|f| escape_field(f.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }
}

impl ResultHandler for CsvHandler {
    fn handle<'a>(&'a mut self, record: &'a EntityRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.header_written {
                self.write_row(&EntityRecord::FIELDS).await?;
                self.header_written = true;
            }
            self.write_row(&record.values()).await
        })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.writer.flush().await?;
            self.writer.get_ref().sync_all().await?;
            Ok(())
        })
    }
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
