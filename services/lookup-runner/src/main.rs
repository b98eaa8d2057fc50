//! Lookup runner
//!
//! Single-binary batch service that:
//! 1. Builds an account pool from a sessions directory and a proxy list
//! 2. Feeds lookup keys into a shared, paced task queue
//! 3. Runs a fixed number of worker loops that lease accounts and resolve keys
//! 4. Writes resolved records through the result sink and persists account
//!    state on the way out

mod config;
mod error;
mod metrics;
mod proxies;
mod session_impl;
mod status;
mod supervisor;
mod tasks;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use account_pool::{Pool, SystemClock, spawn_health_reporter};
use anyhow::{Context, Result, anyhow};
use result_sink::{ResultSink, SinkReport, create_handler};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::session_impl::HttpSessionClient;
use crate::supervisor::{Worker, WorkerStats};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting lookup-runner");

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        sessions_dir = %config.inputs.sessions_dir.display(),
        proxy_file = %config.inputs.proxy_file.display(),
        users_file = %config.inputs.users_file.display(),
        output = %config.output.path.display(),
        format = %config.output.format,
        workers = config.workers.count,
        "configuration loaded"
    );

    let prometheus = metrics::install_recorder()?;

    // --- Pool ---
    let mut proxy_list = proxies::load_proxies(&config.inputs.proxy_file).await?;
    if config.proxy_check.enabled {
        proxy_list = proxies::probe(proxy_list, &config.proxy_check).await?;
    }

    let sources = credentials::discover(&config.inputs.sessions_dir)
        .await
        .with_context(|| {
            format!(
                "failed to discover sessions in {}",
                config.inputs.sessions_dir.display()
            )
        })?;

    let client = HttpSessionClient::new(
        &config.session.endpoint,
        Duration::from_secs(config.session.timeout_secs),
        Duration::from_secs(config.proxy_check.timeout_secs),
    )?;
    let pool = Arc::new(
        Pool::construct(sources, &proxy_list, Arc::new(client), Arc::new(SystemClock))
            .await
            .context("failed to build account pool")?,
    );
    account_pool::health::log_health(&pool.health());

    // --- Sink ---
    let handler = create_handler(config.output.format, &config.output.path)
        .await
        .with_context(|| format!("failed to open {}", config.output.path.display()))?;
    let sink = ResultSink::spawn(handler, config.output.buffer);

    // --- Tasks ---
    let task_list = tasks::load_tasks(&config.inputs.users_file).await?;
    let capacity = config.workers.queue_capacity.unwrap_or(task_list.len());
    let (sender, queue) = tasks::channel(capacity);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let status = match config.observability.metrics_addr {
        Some(addr) => Some(status::serve(addr, pool.clone(), prometheus, cancel.clone()).await?),
        None => None,
    };

    let producer = tokio::spawn(tasks::produce(
        task_list,
        sender,
        config.workers.task_interval(),
        cancel.clone(),
    ));

    let mut workers = JoinSet::new();
    for id in 0..config.workers.count {
        workers.spawn(
            Worker {
                id,
                pool: pool.clone(),
                queue: queue.clone(),
                results: sink.submitter(),
                backoff: config.workers.lease_backoff(),
                cancel: cancel.clone(),
            }
            .run(),
        );
    }
    drop(queue);

    let reporter = spawn_health_reporter(
        pool.clone(),
        Duration::from_secs(config.observability.health_interval_secs),
        cancel.clone(),
    );

    // --- Join ---
    let mut totals = WorkerStats::default();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(stats) => {
                totals.leases += stats.leases;
                totals.resolved += stats.resolved;
                totals.not_found += stats.not_found;
                totals.dropped += stats.dropped;
                totals.failed += stats.failed;
            }
            Err(e) => error!(error = %e, "worker task panicked"),
        }
    }
    info!(
        leases = totals.leases,
        resolved = totals.resolved,
        not_found = totals.not_found,
        dropped = totals.dropped,
        failed = totals.failed,
        "all workers terminated"
    );

    // Stops the producer, the reporter and the status listener.
    cancel.cancel();
    match producer.await {
        Ok(sent) => info!(sent, "producer joined"),
        Err(e) => error!(error = %e, "producer task panicked"),
    }
    if let Err(e) = reporter.await {
        warn!(error = %e, "health reporter task panicked");
    }
    if let Some(handle) = status
        && let Err(e) = handle.await
    {
        warn!(error = %e, "status listener task panicked");
    }

    // --- Shutdown ---
    let closed = sink.close().await;
    match &closed {
        Ok(report) => info!(
            handled = report.handled,
            failed = report.failed,
            "result sink closed"
        ),
        Err(e) => error!(error = %e, "result sink failed to close"),
    }

    // Account state is persisted even when the output could not be flushed.
    let persisted = pool.shutdown().await;
    account_pool::health::log_health(&pool.health());
    shutdown_outcome(closed, persisted)?;

    info!("shutdown complete");
    Ok(())
}

/// Fold the sink close and the pool flush into the process result. Either
/// failure makes the exit non-zero.
fn shutdown_outcome(
    closed: result_sink::Result<SinkReport>,
    persisted: account_pool::Result<()>,
) -> Result<()> {
    match (closed, persisted) {
        (Ok(_), Ok(())) => Ok(()),
        (Err(sink), Ok(())) => Err(anyhow::Error::new(sink).context("failed to flush results")),
        (Ok(_), Err(pool)) => {
            Err(anyhow::Error::new(pool).context("failed to persist account state"))
        }
        (Err(sink), Err(pool)) => Err(anyhow!(
            "failed to flush results ({sink}) and to persist account state ({pool})"
        )),
    }
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use account_pool::PersistFailure;

    fn report() -> SinkReport {
        SinkReport {
            handled: 3,
            failed: 0,
        }
    }

    fn persist_failure() -> account_pool::Error {
        account_pool::Error::Persistence(vec![PersistFailure {
            account_id: "a".into(),
            error: "disk full".into(),
        }])
    }

    #[test]
    fn clean_shutdown_succeeds() {
        assert!(shutdown_outcome(Ok(report()), Ok(())).is_ok());
    }

    #[test]
    fn failed_flush_fails_the_run() {
        let err = shutdown_outcome(
            Err(result_sink::Error::Io("sync failed".into())),
            Ok(()),
        )
        .unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("failed to flush results"), "{text}");
        assert!(text.contains("sync failed"), "{text}");
    }

    #[test]
    fn failed_persist_fails_the_run() {
        let err = shutdown_outcome(Ok(report()), Err(persist_failure())).unwrap_err();
        assert!(format!("{err:#}").contains("disk full"));
    }

    #[test]
    fn both_failures_are_reported() {
        let err = shutdown_outcome(
            Err(result_sink::Error::Io("sync failed".into())),
            Err(persist_failure()),
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("sync failed"), "{text}");
        assert!(text.contains("disk full"), "{text}");
    }
}
