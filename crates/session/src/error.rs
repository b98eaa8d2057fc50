//! Error types for the session and dialer capabilities

/// Errors surfaced by session clients and proxy dialers.
///
/// `Remote` carries the remote service's message verbatim. The pool's failure
/// classifier inspects the rendered text, so implementations must not rewrite
/// the remote wording.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid proxy endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("dial failed: {0}")]
    Dial(String),

    #[error("session setup failed: {0}")]
    Setup(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
