//! Account pool: construction, leasing and state transitions
//!
//! Two-level locking. The pool-level `claim_lock` makes the lease scan
//! ("find an eligible free account, mark it leased") atomic across workers.
//! Each account's own lock guards its fields, so throttle/ban marks and
//! persistence never need the pool lock.
//!
//! Account lifecycle:
//! 1. Construction loads the state record (or starts fresh), fills the app
//!    credential pair from metadata when the record has none, reads the
//!    session material and builds the proxy dialer. Setup failures keep the
//!    account out of the pool and are counted.
//! 2. `lease` hands out eligible accounts in order; the `Lease` guard gives
//!    them back on drop.
//! 3. `mark_throttled` benches an account until a wall-clock deadline;
//!    `mark_banned` evicts it for good. Both are persisted immediately.
//! 4. `shutdown` persists every account and aggregates the failures.

use std::sync::Arc;

use credentials::{
    AccountRecord, AppCredentials, CredentialSource, CredentialStore, load_app_credentials,
};
use serde::Serialize;
use session::{ProxyEndpoint, SessionClient, SessionCredential, SessionHandle};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::Secret;

use crate::account::{Account, Lease};
use crate::clock::Clock;
use crate::error::{Error, PersistFailure, Result};

/// Aggregate pool counters for health reporting.
///
/// `total` counts every credential source, including the ones that failed
/// setup. `eligible` counts loaded accounts passing the eligibility predicate
/// right now, whether or not they are leased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolHealth {
    pub status: &'static str,
    pub total: usize,
    pub eligible: usize,
    pub banned: usize,
    pub throttled: usize,
    pub leased: usize,
    pub setup_failed: usize,
}

pub struct Pool {
    accounts: Vec<Arc<Account>>,
    claim_lock: Mutex<()>,
    setup_failed: usize,
    client: Arc<dyn SessionClient>,
    clock: Arc<dyn Clock>,
}

impl Pool {
    /// Build one account per credential source, assigning proxies round-robin.
    ///
    /// Fails only when either input is empty. Per-account setup failures are
    /// logged, counted in `setup_failed` and leave the account out.
    pub async fn construct(
        sources: Vec<CredentialSource>,
        proxies: &[ProxyEndpoint],
        client: Arc<dyn SessionClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::EmptyInput("no credential sources".into()));
        }
        if proxies.is_empty() {
            return Err(Error::EmptyInput("no proxies".into()));
        }

        let mut accounts = Vec::with_capacity(sources.len());
        let mut setup_failed = 0usize;

        for (i, source) in sources.into_iter().enumerate() {
            let proxy = &proxies[i % proxies.len()];
            match build_account(&source, proxy, client.as_ref()).await {
                Ok(account) => {
                    debug!(account_id = %source.id, proxy = %proxy, "account ready");
                    accounts.push(Arc::new(account));
                }
                Err(reason) => {
                    warn!(account_id = %source.id, error = %reason, "account setup failed, excluding from pool");
                    setup_failed += 1;
                }
            }
        }

        info!(
            accounts = accounts.len(),
            setup_failed,
            proxies = proxies.len(),
            "pool initialized"
        );

        Ok(Self {
            accounts,
            claim_lock: Mutex::new(()),
            setup_failed,
            client,
            clock,
        })
    }

    /// Claim the first eligible, unleased account.
    ///
    /// `None` is the expected "nothing available right now" answer, not an
    /// error; callers back off and retry.
    pub async fn lease(&self) -> Option<Lease> {
        let _claim = self.claim_lock.lock().await;
        let now = self.clock.now();
        for account in &self.accounts {
            if let Some(epoch) = account.try_claim(now) {
                debug!(account_id = account.id(), epoch, "account leased");
                return Some(Lease::new(account.clone(), epoch));
            }
        }
        None
    }

    /// Clear the leased flag. Safe to call repeatedly, and safe to call
    /// before the `Lease` guard drops.
    pub fn release(&self, account: &Account) {
        if account.release() {
            debug!(account_id = account.id(), "account released");
        }
    }

    /// Bench the account until `now + secs`. Last writer wins. Durations
    /// beyond the deadline range clamp to the far future.
    pub async fn mark_throttled(&self, account: &Account, secs: u64) {
        let until = self
            .clock
            .now()
            .saturating_add(i64::try_from(secs).unwrap_or(i64::MAX));
        account.set_throttled_until(until);
        info!(
            account_id = account.id(),
            throttle_secs = secs,
            throttled_until = until,
            "account throttled"
        );
        if let Err(e) = account.persist().await {
            warn!(account_id = account.id(), error = %e, "failed to persist throttle state");
        }
    }

    /// Ban the account permanently. There is no way back.
    pub async fn mark_banned(&self, account: &Account) {
        if !account.ban() {
            debug!(account_id = account.id(), "account already banned");
            return;
        }
        warn!(account_id = account.id(), "account banned");
        if let Err(e) = account.persist().await {
            warn!(account_id = account.id(), error = %e, "failed to persist ban state");
        }
    }

    /// Reload every account's durable record to pick up external edits.
    pub async fn refresh_all(&self) {
        for account in &self.accounts {
            match account.reload().await {
                Ok(true) => {}
                Ok(false) => debug!(account_id = account.id(), "no state record on disk yet"),
                Err(e) => warn!(account_id = account.id(), error = %e, "failed to reload state record"),
            }
        }
    }

    /// Persist every account. Failures are collected, not short-circuited.
    pub async fn shutdown(&self) -> Result<()> {
        let mut failures = Vec::new();
        for account in &self.accounts {
            if let Err(e) = account.persist().await {
                warn!(account_id = account.id(), error = %e, "failed to persist account state");
                failures.push(PersistFailure {
                    account_id: account.id().to_string(),
                    error: e.to_string(),
                });
            }
        }
        if failures.is_empty() {
            info!(accounts = self.accounts.len(), "pool state persisted");
            Ok(())
        } else {
            Err(Error::Persistence(failures))
        }
    }

    /// Open (or reuse) the session for a leased account.
    pub async fn open_session(&self, account: &Account) -> session::Result<Arc<dyn SessionHandle>> {
        account.session(self.client.as_ref()).await
    }

    pub fn is_eligible(&self, account: &Account) -> bool {
        account.is_eligible(self.clock.now())
    }

    /// True when no loaded account can ever be leased again. Throttled
    /// accounts still count as recoverable.
    pub fn is_depleted(&self) -> bool {
        self.accounts.iter().all(|a| a.snapshot().banned)
    }

    pub fn accounts(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    pub fn get(&self, account_id: &str) -> Option<&Arc<Account>> {
        self.accounts.iter().find(|a| a.id() == account_id)
    }

    pub fn health(&self) -> PoolHealth {
        let now = self.clock.now();
        let mut eligible = 0usize;
        let mut banned = 0usize;
        let mut throttled = 0usize;
        let mut leased = 0usize;

        for account in &self.accounts {
            let state = account.snapshot();
            if state.banned {
                banned += 1;
            } else if state.is_throttled(now) {
                throttled += 1;
            } else {
                eligible += 1;
            }
            if state.leased {
                leased += 1;
            }
        }

        let loaded = self.accounts.len();
        let status = if eligible == loaded && loaded > 0 {
            "healthy"
        } else if eligible > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        PoolHealth {
            status,
            total: loaded + self.setup_failed,
            eligible,
            banned,
            throttled,
            leased,
            setup_failed: self.setup_failed,
        }
    }
}

/// Load one account's state and prepare its capabilities.
async fn build_account(
    source: &CredentialSource,
    proxy: &ProxyEndpoint,
    client: &dyn SessionClient,
) -> std::result::Result<Account, String> {
    let store = CredentialStore::new(source.state_path());

    // A corrupt record is a setup failure: defaulting it could silently
    // un-ban the account and the shutdown flush would then overwrite it.
    let mut record = store
        .load()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_else(|| AccountRecord::new(&source.id));
    if record.id.is_empty() {
        record.id = source.id.clone();
    }

    if !record.has_app_credentials() {
        let app = match load_app_credentials(&source.metadata_path()).await {
            Ok(app) => app,
            Err(e) => {
                warn!(account_id = %source.id, error = %e, "bad credential metadata, using default app credentials");
                AppCredentials::default()
            }
        };
        record.app_id = app.app_id;
        record.app_hash = app.app_hash;
    }

    let material = source.read_material().await.map_err(|e| e.to_string())?;
    let dialer = client.dialer(proxy).map_err(|e| e.to_string())?;

    let credential = SessionCredential {
        account_id: source.id.clone(),
        app_id: record.app_id,
        app_hash: Secret::new(record.app_hash.clone()),
        material: Secret::new(material),
    };

    Ok(Account::new(proxy.clone(), credential, dialer, &record, store))
}
