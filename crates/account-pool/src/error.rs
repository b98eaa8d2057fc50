//! Error types for pool operations

use std::fmt;

/// One account whose state could not be written at shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistFailure {
    pub account_id: String,
    pub error: String,
}

impl fmt::Display for PersistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.account_id, self.error)
    }
}

/// Errors that reach the top level. Everything account-scoped is handled
/// (and logged) inside the pool instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("failed to persist {} account state(s): {}", .0.len(), join_failures(.0))]
    Persistence(Vec<PersistFailure>),
}

fn join_failures(failures: &[PersistFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_error_lists_every_account() {
        let err = Error::Persistence(vec![
            PersistFailure {
                account_id: "a".into(),
                error: "disk full".into(),
            },
            PersistFailure {
                account_id: "b".into(),
                error: "read-only".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "failed to persist 2 account state(s): a: disk full; b: read-only"
        );
    }
}
