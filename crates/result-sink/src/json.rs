//! JSON array output
//!
//! Records are buffered and written as one pretty-printed array on flush, so
//! the file only holds a complete document once the sink has closed.

use std::path::Path;

use session::{BoxFuture, EntityRecord};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::handler::ResultHandler;

pub struct JsonArrayHandler {
    file: File,
    records: Vec<EntityRecord>,
}

impl JsonArrayHandler {
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            file,
            records: Vec::new(),
        })
    }
}

impl ResultHandler for JsonArrayHandler {
    fn handle<'a>(&'a mut self, record: &'a EntityRecord) -> BoxFuture<'a, Result<()>> {
        self.records.push(record.clone());
        Box::pin(async { Ok(()) })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut json = serde_json::to_vec_pretty(&self.records)?;
            json.push(b'\n');
            self.file.write_all(&json).await?;
            self.file.flush().await?;
            self.file.sync_all().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_array_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut handler = JsonArrayHandler::create(&path).await.unwrap();

        let record = EntityRecord {
            id: 9,
            username: "carol".into(),
            premium: true,
            ..EntityRecord::default()
        };
        handler.handle(&record).await.unwrap();
        assert!(
            tokio::fs::read_to_string(&path).await.unwrap().is_empty(),
            "nothing is written before flush"
        );

        handler.flush().await.unwrap();
        let decoded: Vec<EntityRecord> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(decoded, vec![record]);
    }

    #[tokio::test]
    async fn empty_run_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut handler = JsonArrayHandler::create(&path).await.unwrap();
        handler.flush().await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap().trim(), "[]");
    }
}
