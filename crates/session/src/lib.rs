//! Capability boundary between the account pool and the remote service
//!
//! The pool and the worker loops never speak the remote protocol. They drive
//! it through three injected capabilities:
//!
//! - `ProxyDialer` opens raw connections through an account's egress proxy.
//!   It is used during setup and validation, never on the task hot path.
//! - `SessionClient` builds dialers and opens sessions for a credential.
//! - `SessionHandle` resolves lookup keys on an open session.
//!
//! Failures come back as `SessionError`, whose text is classified into a
//! `FailureClass` by the pool.

pub mod endpoint;
pub mod error;
pub mod socks;

pub use endpoint::ProxyEndpoint;
pub use error::{Result, SessionError};
pub use socks::Socks5Dialer;

use common::Secret;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpStream;

/// Boxed future used by the capability traits so they stay dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a failed remote call means for the account that made it.
///
/// - `Throttle(secs)` benches the account for that many seconds
/// - `Banned` evicts the account permanently
/// - `Transient` keeps the account; only the task is lost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Throttle(u64),
    Banned,
}

impl FailureClass {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::Throttle(_) => "throttle",
            FailureClass::Banned => "banned",
        }
    }
}

/// A resolved remote entity. Produced by exactly one worker and handed to the
/// result sink once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub premium: bool,
    /// Last-seen unix time, 0 when hidden or currently online
    #[serde(default)]
    pub was_online: i64,
}

impl EntityRecord {
    /// Column names in serialization order.
    pub const FIELDS: [&'static str; 7] = [
        "id",
        "username",
        "phone",
        "first_name",
        "last_name",
        "premium",
        "was_online",
    ];

    /// Field values rendered as text, in `FIELDS` order.
    pub fn values(&self) -> [String; 7] {
        [
            self.id.to_string(),
            self.username.clone(),
            self.phone.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.premium.to_string(),
            self.was_online.to_string(),
        ]
    }
}

/// Everything a session client needs to open a session for one account.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    pub account_id: String,
    pub app_id: i64,
    pub app_hash: Secret<String>,
    /// Raw bytes of the account's session file
    pub material: Secret<Vec<u8>>,
}

/// Opens connections through one egress proxy.
pub trait ProxyDialer: Send + Sync {
    fn endpoint(&self) -> &ProxyEndpoint;

    /// Connect to `address` (`host:port`) through the proxy.
    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<TcpStream>>;
}

/// An open session bound to one account.
pub trait SessionHandle: Send + Sync {
    /// Resolve a lookup key. `Ok(None)` means the remote has no such entity.
    fn resolve<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<EntityRecord>>>;
}

/// Factory for dialers and sessions.
///
/// `dialer` runs once per account while the pool is built; a failure there
/// keeps the account out of the leasable set. `open` runs lazily on first
/// lease and its handle is reused for later leases of the same account.
pub trait SessionClient: Send + Sync {
    fn dialer(&self, proxy: &ProxyEndpoint) -> Result<Arc<dyn ProxyDialer>>;

    fn open<'a>(
        &'a self,
        credential: &'a SessionCredential,
        dialer: Arc<dyn ProxyDialer>,
    ) -> BoxFuture<'a, Result<Arc<dyn SessionHandle>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_class_labels() {
        assert_eq!(FailureClass::Transient.label(), "transient");
        assert_eq!(FailureClass::Throttle(30).label(), "throttle");
        assert_eq!(FailureClass::Banned.label(), "banned");
    }

    #[test]
    fn entity_values_follow_field_order() {
        let record = EntityRecord {
            id: 42,
            username: "durov".into(),
            phone: String::new(),
            first_name: "Pavel".into(),
            last_name: "Durov".into(),
            premium: true,
            was_online: 1_700_000_000,
        };
        let values = record.values();
        assert_eq!(values[0], "42");
        assert_eq!(values[1], "durov");
        assert_eq!(values[5], "true");
        assert_eq!(values[6], "1700000000");
        assert_eq!(EntityRecord::FIELDS.len(), values.len());
    }

    #[test]
    fn entity_decodes_with_missing_optional_fields() {
        let record: EntityRecord = serde_json::from_str(r#"{"id":7,"username":"x"}"#).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.username, "x");
        assert!(!record.premium);
        assert_eq!(record.was_online, 0);
    }

    #[test]
    fn credential_debug_hides_material() {
        let credential = SessionCredential {
            account_id: "acct".into(),
            app_id: 2040,
            app_hash: Secret::new("hash-value".into()),
            material: Secret::new(b"raw-session".to_vec()),
        };
        let debug = format!("{credential:?}");
        assert!(debug.contains("acct"));
        assert!(!debug.contains("hash-value"));
    }
}
