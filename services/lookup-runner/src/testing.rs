//! Fakes shared by the runner tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use account_pool::{ManualClock, Pool};
use credentials::CredentialSource;
use session::{
    BoxFuture, EntityRecord, ProxyDialer, ProxyEndpoint, SessionClient, SessionCredential,
    SessionError, SessionHandle,
};
use tokio::net::TcpStream;

struct OfflineDialer(ProxyEndpoint);

impl ProxyDialer for OfflineDialer {
    fn endpoint(&self) -> &ProxyEndpoint {
        &self.0
    }

    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, session::Result<TcpStream>> {
        Box::pin(async move { Err(SessionError::Dial(format!("offline: {address}"))) })
    }
}

/// Scripted remote: keys listed in `failures` fail with their message, keys
/// in `missing` resolve to nothing, everything else resolves to a record
/// whose `username` is the key and whose `first_name` is the account id.
#[derive(Default)]
pub struct FakeSessionClient {
    failures: HashMap<String, String>,
    missing: Vec<String>,
    open_failures: HashMap<String, String>,
    pub opens: AtomicUsize,
    /// (account id, key) for every resolve call, in call order
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeSessionClient {
    pub fn fail_key(mut self, key: &str, message: &str) -> Self {
        self.failures.insert(key.into(), message.into());
        self
    }

    pub fn missing_key(mut self, key: &str) -> Self {
        self.missing.push(key.into());
        self
    }

    pub fn fail_open(mut self, account_id: &str, message: &str) -> Self {
        self.open_failures.insert(account_id.into(), message.into());
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

struct FakeSession {
    account_id: String,
    failures: HashMap<String, String>,
    missing: Vec<String>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl SessionHandle for FakeSession {
    fn resolve<'a>(&'a self, key: &'a str) -> BoxFuture<'a, session::Result<Option<EntityRecord>>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((self.account_id.clone(), key.to_string()));
            if let Some(message) = self.failures.get(key) {
                return Err(SessionError::Remote(message.clone()));
            }
            if self.missing.iter().any(|m| m == key) {
                return Ok(None);
            }
            Ok(Some(EntityRecord {
                id: key.len() as i64,
                username: key.to_string(),
                first_name: self.account_id.clone(),
                ..Default::default()
            }))
        })
    }
}

impl SessionClient for FakeSessionClient {
    fn dialer(&self, proxy: &ProxyEndpoint) -> session::Result<Arc<dyn ProxyDialer>> {
        Ok(Arc::new(OfflineDialer(proxy.clone())))
    }

    fn open<'a>(
        &'a self,
        credential: &'a SessionCredential,
        _dialer: Arc<dyn ProxyDialer>,
    ) -> BoxFuture<'a, session::Result<Arc<dyn SessionHandle>>> {
        Box::pin(async move {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.open_failures.get(&credential.account_id) {
                return Err(SessionError::Remote(message.clone()));
            }
            Ok(Arc::new(FakeSession {
                account_id: credential.account_id.clone(),
                failures: self.failures.clone(),
                missing: self.missing.clone(),
                calls: self.calls.clone(),
            }) as Arc<dyn SessionHandle>)
        })
    }
}

/// Pool over fresh accounts `ids` (in that order) behind one proxy.
pub async fn build_pool(
    dir: &Path,
    ids: &[&str],
    client: Arc<FakeSessionClient>,
    clock: Arc<ManualClock>,
) -> Arc<Pool> {
    let mut sources = Vec::new();
    for id in ids {
        let path = dir.join(format!("{id}.session"));
        tokio::fs::write(&path, b"session-bytes").await.unwrap();
        sources.push(CredentialSource::from_session_path(path).unwrap());
    }
    let proxy = ProxyEndpoint::parse_line("10.0.0.1:1080:u:p").unwrap();
    Arc::new(
        Pool::construct(sources, &[proxy], client, clock)
            .await
            .unwrap(),
    )
}
