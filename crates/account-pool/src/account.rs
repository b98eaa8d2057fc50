//! A single pooled account and its lease guard
//!
//! Each account guards its mutable fields with its own short-lived std Mutex.
//! The lock is never held across an await: persistence snapshots the fields
//! under the lock and writes the snapshot afterwards, so a slow disk never
//! stalls the pool-wide lease scan. The snapshot is taken inside the store's
//! write lock, so concurrent persists land in snapshot order.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use credentials::{AccountRecord, CredentialStore};
use session::{ProxyDialer, ProxyEndpoint, SessionClient, SessionCredential, SessionHandle};
use tokio::sync::OnceCell;
use tracing::debug;

/// Mutable per-account fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub banned: bool,
    pub throttled_until: i64,
    pub usage_count: u64,
    pub last_used: i64,
    pub leased: bool,
    /// Bumped on every claim so a stale guard cannot release a newer lease.
    pub lease_epoch: u64,
}

impl AccountSnapshot {
    /// The eligibility predicate: not banned and not currently throttled.
    pub fn is_eligible(&self, now: i64) -> bool {
        !self.banned && now >= self.throttled_until
    }

    pub fn is_throttled(&self, now: i64) -> bool {
        !self.banned && now < self.throttled_until
    }
}

pub struct Account {
    id: String,
    proxy: ProxyEndpoint,
    credential: SessionCredential,
    dialer: Arc<dyn ProxyDialer>,
    session: OnceCell<Arc<dyn SessionHandle>>,
    state: Mutex<AccountSnapshot>,
    store: CredentialStore,
}

impl Account {
    pub(crate) fn new(
        proxy: ProxyEndpoint,
        credential: SessionCredential,
        dialer: Arc<dyn ProxyDialer>,
        record: &AccountRecord,
        store: CredentialStore,
    ) -> Self {
        Self {
            id: credential.account_id.clone(),
            proxy,
            credential,
            dialer,
            session: OnceCell::new(),
            state: Mutex::new(AccountSnapshot {
                banned: record.banned,
                throttled_until: record.throttled_until,
                usage_count: record.usage_count,
                last_used: record.last_used,
                leased: false,
                lease_epoch: 0,
            }),
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn proxy(&self) -> &ProxyEndpoint {
        &self.proxy
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        *self.state()
    }

    pub fn is_eligible(&self, now: i64) -> bool {
        self.state().is_eligible(now)
    }

    /// Session handle for this account, opened on first use and reused by
    /// every later lease. A failed open leaves the cell empty so the next
    /// lease tries again.
    pub async fn session(
        &self,
        client: &dyn SessionClient,
    ) -> session::Result<Arc<dyn SessionHandle>> {
        self.session
            .get_or_try_init(|| async {
                debug!(account_id = %self.id, proxy = %self.proxy, "opening session");
                client.open(&self.credential, self.dialer.clone()).await
            })
            .await
            .cloned()
    }

    /// Claim the account if it is eligible and free. Stamps usage on success
    /// and returns the new lease epoch.
    pub(crate) fn try_claim(&self, now: i64) -> Option<u64> {
        let mut state = self.state();
        if state.leased || !state.is_eligible(now) {
            return None;
        }
        state.leased = true;
        state.lease_epoch += 1;
        state.usage_count += 1;
        state.last_used = now;
        Some(state.lease_epoch)
    }

    /// Clear the leased flag. Returns whether the account was leased.
    pub(crate) fn release(&self) -> bool {
        std::mem::replace(&mut self.state().leased, false)
    }

    /// Release only if `epoch` is still the current lease.
    fn release_epoch(&self, epoch: u64) -> bool {
        let mut state = self.state();
        if !state.leased || state.lease_epoch != epoch {
            return false;
        }
        state.leased = false;
        true
    }

    pub(crate) fn set_throttled_until(&self, until: i64) {
        self.state().throttled_until = until;
    }

    /// Returns false if the account was already banned.
    pub(crate) fn ban(&self) -> bool {
        !std::mem::replace(&mut self.state().banned, true)
    }

    /// Fold a freshly loaded record into memory. Bans only ever accumulate
    /// and the later throttle deadline wins, so a stale record (a failed or
    /// racing persist) never frees the account early. Counters keep the
    /// larger value. The leased flag is untouched.
    pub(crate) fn apply_record(&self, record: &AccountRecord) {
        let mut state = self.state();
        state.banned |= record.banned;
        state.throttled_until = state.throttled_until.max(record.throttled_until);
        state.usage_count = state.usage_count.max(record.usage_count);
        state.last_used = state.last_used.max(record.last_used);
    }

    pub(crate) fn to_record(&self) -> AccountRecord {
        let state = self.snapshot();
        AccountRecord {
            id: self.id.clone(),
            app_id: self.credential.app_id,
            app_hash: self.credential.app_hash.expose().clone(),
            banned: state.banned,
            usage_count: state.usage_count,
            last_used: state.last_used,
            throttled_until: state.throttled_until,
        }
    }

    pub(crate) async fn persist(&self) -> credentials::Result<()> {
        self.store.save_with(|| self.to_record()).await
    }

    pub(crate) async fn reload(&self) -> credentials::Result<bool> {
        match self.store.load().await? {
            Some(record) => {
                self.apply_record(&record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, AccountSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("proxy", &self.proxy.to_string())
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Exclusive hold on one account. Dropping the lease releases the account,
/// so every exit path of the holder (including unwinding) gives it back.
#[derive(Debug)]
pub struct Lease {
    account: Arc<Account>,
    epoch: u64,
}

impl Lease {
    pub(crate) fn new(account: Arc<Account>, epoch: u64) -> Self {
        Self { account, epoch }
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }
}

impl Deref for Lease {
    type Target = Account;

    fn deref(&self) -> &Account {
        &self.account
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.account.release_epoch(self.epoch) {
            debug!(account_id = %self.account.id, epoch = self.epoch, "lease released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_predicate() {
        let mut state = AccountSnapshot::default();
        assert!(state.is_eligible(100));

        state.throttled_until = 130;
        assert!(!state.is_eligible(129));
        assert!(state.is_throttled(129));
        assert!(state.is_eligible(130));
        assert!(!state.is_throttled(130));

        state.banned = true;
        assert!(!state.is_eligible(1_000));
        assert!(!state.is_throttled(0), "a banned account counts as banned only");
    }
}
