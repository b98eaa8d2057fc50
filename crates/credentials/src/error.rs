//! Error types for credential store operations

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("state record parse error: {0}")]
    Parse(String),

    #[error("credential metadata error: {0}")]
    Metadata(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
