//! Account pool for pooled remote-service sessions
//!
//! Owns every loaded account and decides which one a worker may use next.
//! Accounts are leased exclusively, benched on throttle notices until a
//! wall-clock deadline, and evicted permanently on ban markers. All state
//! changes that matter across runs are written through the credential store
//! as they happen.
//!
//! Time comes from an injected `Clock` so throttle expiry can be driven in
//! tests without sleeping.

pub mod account;
pub mod classify;
pub mod clock;
pub mod error;
pub mod health;
pub mod pool;

#[cfg(test)]
mod testing;

pub use account::{Account, AccountSnapshot, Lease};
pub use classify::{classify, classify_message};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, PersistFailure, Result};
pub use health::spawn_health_reporter;
pub use pool::{Pool, PoolHealth};
