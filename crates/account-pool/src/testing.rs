//! Fakes shared by the pool tests

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use credentials::{AccountRecord, CredentialSource, CredentialStore};
use session::{
    BoxFuture, EntityRecord, ProxyDialer, ProxyEndpoint, SessionClient, SessionCredential,
    SessionError, SessionHandle,
};
use tokio::net::TcpStream;

use crate::clock::ManualClock;
use crate::pool::Pool;

pub const START: i64 = 1_700_000_000;

pub struct NullDialer(ProxyEndpoint);

impl ProxyDialer for NullDialer {
    fn endpoint(&self) -> &ProxyEndpoint {
        &self.0
    }

    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, session::Result<TcpStream>> {
        Box::pin(async move { Err(SessionError::Dial(format!("no network for {address}"))) })
    }
}

pub struct EchoSession;

impl SessionHandle for EchoSession {
    fn resolve<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, session::Result<Option<EntityRecord>>> {
        Box::pin(async move {
            Ok(Some(EntityRecord {
                id: 1,
                username: key.to_string(),
                phone: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                premium: false,
                was_online: 0,
            }))
        })
    }
}

/// Client whose dialer setup fails for proxies on `bad_host`, and which
/// counts session opens.
#[derive(Default)]
pub struct FakeClient {
    pub bad_host: Option<String>,
    pub opens: AtomicUsize,
}

impl SessionClient for FakeClient {
    fn dialer(&self, proxy: &ProxyEndpoint) -> session::Result<Arc<dyn ProxyDialer>> {
        if self.bad_host.as_deref() == Some(proxy.host.as_str()) {
            return Err(SessionError::Setup("dialer refused".into()));
        }
        Ok(Arc::new(NullDialer(proxy.clone())))
    }

    fn open<'a>(
        &'a self,
        _credential: &'a SessionCredential,
        _dialer: Arc<dyn ProxyDialer>,
    ) -> BoxFuture<'a, session::Result<Arc<dyn SessionHandle>>> {
        Box::pin(async move {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoSession) as Arc<dyn SessionHandle>)
        })
    }
}

pub fn proxies(n: usize) -> Vec<ProxyEndpoint> {
    (0..n)
        .map(|i| ProxyEndpoint::parse_line(&format!("10.0.0.{}:1080:u:p", i + 1)).unwrap())
        .collect()
}

pub async fn write_sources(dir: &Path, ids: &[&str]) -> Vec<CredentialSource> {
    let mut sources = Vec::new();
    for id in ids {
        let path = dir.join(format!("{id}.session"));
        tokio::fs::write(&path, b"session-bytes").await.unwrap();
        sources.push(CredentialSource::from_session_path(path).unwrap());
    }
    sources
}

pub async fn write_record(dir: &Path, record: &AccountRecord) {
    CredentialStore::new(dir.join(format!("{}.state", record.id)))
        .save(record)
        .await
        .unwrap();
}

/// Pool over fresh accounts `ids` with `n_proxies` proxies and a manual clock.
pub async fn build(
    dir: &Path,
    ids: &[&str],
    n_proxies: usize,
) -> (Pool, Arc<ManualClock>, Arc<FakeClient>) {
    let sources = write_sources(dir, ids).await;
    let clock = Arc::new(ManualClock::new(START));
    let client = Arc::new(FakeClient::default());
    let pool = Pool::construct(sources, &proxies(n_proxies), client.clone(), clock.clone())
        .await
        .unwrap();
    (pool, clock, client)
}
