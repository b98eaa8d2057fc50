//! JSON Lines output: one compact object per record

use std::path::Path;

use session::{BoxFuture, EntityRecord};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;
use crate::handler::ResultHandler;

pub struct JsonLinesHandler {
    writer: BufWriter<File>,
}

impl JsonLinesHandler {
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ResultHandler for JsonLinesHandler {
    fn handle<'a>(&'a mut self, record: &'a EntityRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut line = serde_json::to_vec(record)?;
            line.push(b'\n');
            self.writer.write_all(&line).await?;
            Ok(())
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
