//! Error types for the result sink

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("output I/O error: {0}")]
    Io(String),

    #[error("encoding result: {0}")]
    Encode(String),

    #[error("result sink is closed")]
    Closed,

    #[error("result sink consumer panicked: {0}")]
    ConsumerPanicked(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
