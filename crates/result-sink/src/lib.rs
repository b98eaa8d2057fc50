//! Result sink pipeline
//!
//! Workers submit resolved records concurrently; a single consumer task
//! hands them to one `ResultHandler` in arrival order. Closing the sink
//! drains everything already submitted and flushes the handler once.

pub mod csv;
pub mod error;
pub mod handler;
pub mod json;
pub mod jsonl;
pub mod memory;
pub mod pipeline;

pub use csv::CsvHandler;
pub use error::{Error, Result};
pub use handler::{OutputFormat, ResultHandler, create_handler};
pub use json::JsonArrayHandler;
pub use jsonl::JsonLinesHandler;
pub use memory::{MemoryHandler, MemoryReader};
pub use pipeline::{ResultSink, SinkReport, Submitter};
