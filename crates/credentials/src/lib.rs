//! Credential store for pooled remote-service accounts
//!
//! Each account is a `*.session` file in the sessions directory. Two sibling
//! files share its stem:
//!
//! - `<stem>.state` is the durable state record (ban flag, throttle deadline,
//!   usage counters, app credential pair), owned by this crate
//! - `<stem>.json` is optional credential metadata carrying the app id/hash
//!
//! The store is pure data access. Its only concurrency control is the
//! per-record write lock that keeps two saves of the same record from
//! interleaving.

pub mod constants;
pub mod error;
pub mod metadata;
pub mod record;
pub mod source;

pub use constants::*;
pub use error::{Error, Result};
pub use metadata::{AppCredentials, load_app_credentials};
pub use record::{AccountRecord, CredentialStore};
pub use source::{CredentialSource, discover};
