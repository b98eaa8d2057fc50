//! Shared types for the lookup runner workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
