//! Status listener: `/health` (pool health JSON) and `/metrics`

use std::net::SocketAddr;
use std::sync::Arc;

use account_pool::Pool;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
struct StatusState {
    pool: Arc<Pool>,
    prometheus: PrometheusHandle,
}

fn build_router(pool: Arc<Pool>, prometheus: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(StatusState { pool, prometheus })
}

/// Bind `addr` and serve until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    pool: Arc<Pool>,
    prometheus: PrometheusHandle,
    cancel: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "status listener started");
    let app = build_router(pool, prometheus);

    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "status listener failed");
        }
    }))
}

/// 200 while any account is eligible, 503 when none is.
async fn health_handler(State(state): State<StatusState>) -> impl IntoResponse {
    let health = state.pool.health();
    let code = if health.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = serde_json::to_string(&health).unwrap_or_else(|_| "{}".into());
    (code, [(header::CONTENT_TYPE, "application/json")], body)
}

async fn metrics_handler(State(state): State<StatusState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_pool, FakeSessionClient};
    use account_pool::ManualClock;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn test_prometheus_handle() -> PrometheusHandle {
        PrometheusBuilder::new().build_recorder().handle()
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_reports_pool_counters() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeSessionClient::default());
        let pool = build_pool(dir.path(), &["a", "b"], client, Arc::new(ManualClock::new(0))).await;

        let (status, body) = get_body(build_router(pool, test_prometheus_handle()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["total"], 2);
        assert_eq!(json["eligible"], 2);
    }

    #[tokio::test]
    async fn health_is_503_when_no_account_is_eligible() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeSessionClient::default());
        let pool = build_pool(dir.path(), &["a"], client, Arc::new(ManualClock::new(0))).await;
        let account = pool.get("a").unwrap().clone();
        pool.mark_banned(&account).await;

        let (status, body) = get_body(build_router(pool, test_prometheus_handle()), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("\"unhealthy\""));
    }

    #[tokio::test]
    async fn metrics_route_renders_exposition_text() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeSessionClient::default());
        let pool = build_pool(dir.path(), &["a"], client, Arc::new(ManualClock::new(0))).await;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            crate::metrics::record_task(crate::metrics::TaskOutcome::Resolved);
        });

        let (status, body) = get_body(build_router(pool, handle), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("lookup_tasks_total"), "got: {body}");
    }
}
