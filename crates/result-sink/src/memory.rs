//! In-memory capture, for tests and dry runs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use session::{BoxFuture, EntityRecord};

use crate::error::Result;
use crate::handler::ResultHandler;

#[derive(Default)]
struct Captured {
    records: Mutex<Vec<EntityRecord>>,
    flushes: AtomicUsize,
}

#[derive(Default)]
pub struct MemoryHandler {
    captured: Arc<Captured>,
}

/// Read side of a `MemoryHandler`, usable after the handler has moved into
/// the sink.
#[derive(Clone)]
pub struct MemoryReader {
    captured: Arc<Captured>,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> MemoryReader {
        MemoryReader {
            captured: self.captured.clone(),
        }
    }
}

impl MemoryReader {
    /// Copy of the records handled so far, in handling order.
    pub fn records(&self) -> Vec<EntityRecord> {
        self.captured
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn flush_count(&self) -> usize {
        self.captured.flushes.load(Ordering::SeqCst)
    }
}

impl ResultHandler for MemoryHandler {
    fn handle<'a>(&'a mut self, record: &'a EntityRecord) -> BoxFuture<'a, Result<()>> {
        self.captured
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Box::pin(async { Ok(()) })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<()>> {
        self.captured.flushes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}
