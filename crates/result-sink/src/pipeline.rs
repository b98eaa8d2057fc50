//! Single-consumer fan-in from workers to one handler
//!
//! Submitters share a bounded channel; a full buffer applies backpressure to
//! the workers. `close` tells the consumer to stop accepting new records,
//! drain whatever is buffered, and flush the handler exactly once.

use session::EntityRecord;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::handler::ResultHandler;

/// Outcome counts reported when the sink closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub handled: u64,
    pub failed: u64,
}

/// Cloneable submission side, handed to each worker.
#[derive(Debug, Clone)]
pub struct Submitter {
    tx: mpsc::Sender<EntityRecord>,
}

impl Submitter {
    /// Queue a record for the handler. Fails with `Closed` once the sink has
    /// started closing; a record accepted here is handled before the flush.
    pub async fn submit(&self, record: EntityRecord) -> Result<()> {
        self.tx.send(record).await.map_err(|_| Error::Closed)
    }
}

pub struct ResultSink {
    submitter: Submitter,
    close_tx: oneshot::Sender<()>,
    consumer: JoinHandle<Result<SinkReport>>,
}

impl ResultSink {
    /// Start the consumer task. `buffer` is the channel capacity (minimum 1).
    pub fn spawn(handler: Box<dyn ResultHandler>, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let consumer = tokio::spawn(consume(rx, close_rx, handler));
        Self {
            submitter: Submitter { tx },
            close_tx,
            consumer,
        }
    }

    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    pub async fn submit(&self, record: EntityRecord) -> Result<()> {
        self.submitter.submit(record).await
    }

    /// Stop accepting records, drain the buffer and flush the handler.
    ///
    /// Outstanding `Submitter` clones do not keep the sink open; their later
    /// submits fail with `Closed`.
    pub async fn close(self) -> Result<SinkReport> {
        // The consumer may already be gone if it panicked; the join below
        // reports that.
        let _ = self.close_tx.send(());
        drop(self.submitter);
        match self.consumer.await {
            Ok(result) => result,
            Err(e) => Err(Error::ConsumerPanicked(e.to_string())),
        }
    }
}

async fn consume(
    mut rx: mpsc::Receiver<EntityRecord>,
    mut close_rx: oneshot::Receiver<()>,
    mut handler: Box<dyn ResultHandler>,
) -> Result<SinkReport> {
    let mut report = SinkReport::default();

    loop {
        tokio::select! {
            biased;
            // Fires on close and also if the sink was dropped unclosed.
            _ = &mut close_rx => {
                rx.close();
                break;
            }
            record = rx.recv() => match record {
                Some(record) => handle_one(handler.as_mut(), &record, &mut report).await,
                None => break,
            },
        }
    }

    // After `close`, `recv` yields what is still buffered and then `None`.
    while let Some(record) = rx.recv().await {
        handle_one(handler.as_mut(), &record, &mut report).await;
    }

    handler.flush().await?;
    info!(
        handled = report.handled,
        failed = report.failed,
        "result sink flushed"
    );
    Ok(report)
}

async fn handle_one(
    handler: &mut dyn ResultHandler,
    record: &EntityRecord,
    report: &mut SinkReport,
) {
    match handler.handle(record).await {
        Ok(()) => {
            report.handled += 1;
            debug!(entity_id = record.id, username = %record.username, "result written");
        }
        Err(e) => {
            report.failed += 1;
            warn!(entity_id = record.id, error = %e, "failed to write result");
        }
    }
}
