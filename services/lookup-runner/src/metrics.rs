//! Prometheus metrics
//!
//! - `lookup_tasks_total` (counter): label `outcome` (resolved, not_found,
//!   dropped, failed)
//! - `lookup_dispatch_failures_total` (counter): label `class`
//! - `lookup_resolve_duration_seconds` (histogram)
//!
//! Pool gauges (`pool_accounts{state}`) are published by the pool's health
//! reporter. Rendering happens on the status listener's `/metrics` route.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use session::FailureClass;

const RESOLVE_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// What happened to one task pulled from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Resolved,
    NotFound,
    /// Abandoned before dispatch because the account went ineligible
    Dropped,
    Failed,
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Resolved => "resolved",
            TaskOutcome::NotFound => "not_found",
            TaskOutcome::Dropped => "dropped",
            TaskOutcome::Failed => "failed",
        }
    }
}

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("lookup_resolve_duration_seconds".to_string()),
            RESOLVE_BUCKETS,
        )
        .context("failed to set histogram buckets")
}

/// Install the global recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

pub fn record_task(outcome: TaskOutcome) {
    metrics::counter!("lookup_tasks_total", "outcome" => outcome.label()).increment(1);
}

pub fn record_dispatch_failure(class: FailureClass) {
    metrics::counter!("lookup_dispatch_failures_total", "class" => class.label()).increment(1);
}

pub fn record_resolve_duration(secs: f64) {
    metrics::histogram!("lookup_resolve_duration_seconds").record(secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_task(TaskOutcome::Resolved);
        record_dispatch_failure(FailureClass::Transient);
        record_resolve_duration(0.2);
    }

    /// Isolated recorder/handle pair; only one global recorder can exist per
    /// process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn task_outcomes_are_labelled() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_task(TaskOutcome::Resolved);
        record_task(TaskOutcome::Resolved);
        record_task(TaskOutcome::NotFound);
        record_task(TaskOutcome::Dropped);

        let output = handle.render();
        assert!(
            output.contains("lookup_tasks_total{outcome=\"resolved\"} 2"),
            "got: {output}"
        );
        assert!(output.contains("outcome=\"not_found\""));
        assert!(output.contains("outcome=\"dropped\""));
    }

    #[test]
    fn dispatch_failures_carry_class() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_dispatch_failure(FailureClass::Throttle(30));
        record_dispatch_failure(FailureClass::Banned);

        let output = handle.render();
        assert!(output.contains("class=\"throttle\""), "got: {output}");
        assert!(output.contains("class=\"banned\""), "got: {output}");
    }

    #[test]
    fn resolve_duration_renders_as_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_resolve_duration(0.3);

        let output = handle.render();
        assert!(output.contains("lookup_resolve_duration_seconds_bucket"));
        assert!(output.contains("le=\"0.01\""));
        assert!(output.contains("le=\"60\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
