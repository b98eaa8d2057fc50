//! Periodic pool health reporting
//!
//! Every interval the reporter reloads durable records (so external edits to
//! ban or throttle state take effect), logs the aggregate counters and
//! publishes them as `pool_accounts{state}` gauges.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pool::{Pool, PoolHealth};

/// Spawn the reporter. It stops when `cancel` fires.
pub fn spawn_health_reporter(
    pool: Arc<Pool>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The pool was just built; skip the immediate first tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    report(&pool).await;
                }
            }
        }
    })
}

/// Run one cycle: refresh, then log and publish.
pub async fn report(pool: &Pool) -> PoolHealth {
    pool.refresh_all().await;
    let health = pool.health();
    log_health(&health);
    record_gauges(&health);
    health
}

pub fn log_health(health: &PoolHealth) {
    if health.status == "unhealthy" {
        warn!(
            status = health.status,
            total = health.total,
            eligible = health.eligible,
            banned = health.banned,
            throttled = health.throttled,
            leased = health.leased,
            setup_failed = health.setup_failed,
            "pool health"
        );
    } else {
        info!(
            status = health.status,
            total = health.total,
            eligible = health.eligible,
            banned = health.banned,
            throttled = health.throttled,
            leased = health.leased,
            setup_failed = health.setup_failed,
            "pool health"
        );
    }
}

pub fn record_gauges(health: &PoolHealth) {
    for (state, value) in [
        ("total", health.total),
        ("eligible", health.eligible),
        ("banned", health.banned),
        ("throttled", health.throttled),
        ("leased", health.leased),
        ("setup_failed", health.setup_failed),
    ] {
        metrics::gauge!("pool_accounts", "state" => state).set(value as f64);
    }
}
