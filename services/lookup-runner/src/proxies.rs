//! Proxy list loading and reachability probing

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use session::{ProxyDialer, ProxyEndpoint, Socks5Dialer};
use tracing::{info, warn};

use crate::config::ProxyCheckConfig;
use crate::error::{Error, Result};

/// Read `host:port:login:password` lines. Malformed lines are skipped with
/// a warning; a file with no usable line is an error.
pub async fn load_proxies(path: &Path) -> Result<Vec<ProxyEndpoint>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::ReadInput {
            path: path.to_path_buf(),
            source,
        })?;
    let proxies = parse_proxies(&contents);
    if proxies.is_empty() {
        return Err(Error::NoProxies(path.to_path_buf()));
    }
    info!(path = %path.display(), proxies = proxies.len(), "loaded proxy list");
    Ok(proxies)
}

fn parse_proxies(contents: &str) -> Vec<ProxyEndpoint> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match ProxyEndpoint::parse_line(line) {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                warn!(line = i + 1, error = %e, "skipping invalid proxy line");
                None
            }
        })
        .collect()
}

/// Dial the probe target through every proxy and keep the ones that answer.
pub async fn probe(
    proxies: Vec<ProxyEndpoint>,
    check: &ProxyCheckConfig,
) -> Result<Vec<ProxyEndpoint>> {
    let timeout = Duration::from_secs(check.timeout_secs);
    let target = check.target.as_str();
    probe_with(proxies, check.concurrency, |endpoint| async move {
        let dialer = Socks5Dialer::new(endpoint, timeout);
        // Dial and discard; the stream drops here.
        dialer.dial(target).await.map(|_| ())
    })
    .await
}

/// Probe with an arbitrary check, at most `concurrency` at a time. Survivors
/// keep their input order.
async fn probe_with<F, Fut>(
    proxies: Vec<ProxyEndpoint>,
    concurrency: usize,
    check: F,
) -> Result<Vec<ProxyEndpoint>>
where
    F: Fn(ProxyEndpoint) -> Fut,
    Fut: Future<Output = session::Result<()>>,
{
    let total = proxies.len();
    let checked: Vec<(ProxyEndpoint, session::Result<()>)> = stream::iter(proxies)
        .map(|endpoint| {
            let fut = check(endpoint.clone());
            async move { (endpoint, fut.await) }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let reachable: Vec<ProxyEndpoint> = checked
        .into_iter()
        .filter_map(|(endpoint, result)| match result {
            Ok(()) => Some(endpoint),
            Err(e) => {
                warn!(proxy = %endpoint, error = %e, "proxy unreachable, dropping");
                None
            }
        })
        .collect();

    info!(total, reachable = reachable.len(), "proxy check complete");
    if reachable.is_empty() {
        return Err(Error::AllProxiesUnreachable(total));
    }
    Ok(reachable)
}
