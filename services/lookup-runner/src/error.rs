//! Service-specific error types
//!
//! Only input loading and proxy probing surface errors of their own; account
//! and task failures are handled inside the pool and the worker loops.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no usable proxies in {}", .0.display())]
    NoProxies(PathBuf),

    #[error("all {0} proxies failed the reachability check")]
    AllProxiesUnreachable(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
