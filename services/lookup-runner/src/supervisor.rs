//! Worker supervision loop
//!
//! Pure state machine: `transition` receives an event and returns
//! (new_state, action). `Worker::run` performs the I/O for each state and
//! feeds the outcome back in as the next event.
//!
//! ```text
//! ACQUIRING -> RUNNING -> RELEASING -> ACQUIRING
//!     |                       |
//!     +-----> TERMINATED <----+
//! ```
//!
//! The lease is held in `Worker::run`'s frame, so it is released when
//! RUNNING ends on any path, unwinding included.

use std::sync::Arc;
use std::time::{Duration, Instant};

use account_pool::{Lease, Pool, classify};
use result_sink::Submitter;
use session::{FailureClass, SessionHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::{self, TaskOutcome};
use crate::tasks::{Pulled, TaskQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Acquiring,
    Running,
    /// Leaving RUNNING. `stop` is set when the run ended in a way that rules
    /// out another lease.
    Releasing { stop: bool },
    Terminated,
}

/// Why RUNNING ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// Channel closed and drained
    QueueClosed,
    Cancelled,
    /// The account failed the eligibility re-check; the task was dropped
    AccountIneligible,
    /// The session could not be opened
    SessionFailed(FailureClass),
    /// A dispatch failure evicted the account
    Evicted(FailureClass),
    /// The result sink stopped accepting records
    SinkClosed,
}

impl RunExit {
    fn ends_worker(&self) -> bool {
        matches!(self, RunExit::Cancelled | RunExit::SinkClosed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    Leased,
    /// `Lease()` found nothing; `depleted` when no account can ever recover
    NoAccount { depleted: bool },
    /// Producer finished and the channel is closed and drained
    QueueExhausted,
    Cancelled,
    RunEnded(RunExit),
    Released { shutdown: bool, exhausted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerAction {
    /// Start consuming tasks with the held lease
    Run,
    /// Wait one backoff interval (or until cancelled), then acquire again
    Backoff,
    Release,
    Acquire,
    Exit,
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn transition(state: WorkerState, event: WorkerEvent) -> (WorkerState, WorkerAction) {
    match (state, event) {
        (WorkerState::Terminated, _) => (WorkerState::Terminated, WorkerAction::Exit),

        // --- Acquiring ---
        (WorkerState::Acquiring, WorkerEvent::Leased) => (WorkerState::Running, WorkerAction::Run),
        (WorkerState::Acquiring, WorkerEvent::NoAccount { depleted: false }) => {
            (WorkerState::Acquiring, WorkerAction::Backoff)
        }
        (
            WorkerState::Acquiring,
            WorkerEvent::NoAccount { depleted: true }
            | WorkerEvent::QueueExhausted
            | WorkerEvent::Cancelled,
        ) => (WorkerState::Terminated, WorkerAction::Exit),

        // --- Running ---
        (WorkerState::Running, WorkerEvent::RunEnded(exit)) => (
            WorkerState::Releasing {
                stop: exit.ends_worker(),
            },
            WorkerAction::Release,
        ),
        (WorkerState::Running, WorkerEvent::Cancelled) => (
            WorkerState::Releasing { stop: true },
            WorkerAction::Release,
        ),

        // --- Releasing ---
        (
            WorkerState::Releasing { stop },
            WorkerEvent::Released {
                shutdown,
                exhausted,
            },
        ) => {
            if stop || shutdown || exhausted {
                (WorkerState::Terminated, WorkerAction::Exit)
            } else {
                (WorkerState::Acquiring, WorkerAction::Acquire)
            }
        }

        // --- Invalid/unhandled transition: stay in current state ---
        (state, _event) => (state, WorkerAction::None),
    }
}

/// Per-worker counters, returned when the loop terminates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub leases: u64,
    pub resolved: u64,
    pub not_found: u64,
    pub dropped: u64,
    pub failed: u64,
}

pub struct Worker {
    pub id: usize,
    pub pool: Arc<Pool>,
    pub queue: TaskQueue,
    pub results: Submitter,
    pub backoff: Duration,
    pub cancel: CancellationToken,
}

impl Worker {
    /// Run the supervision loop until TERMINATED.
    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut state = WorkerState::Acquiring;
        let mut lease: Option<Lease> = None;

        info!(worker = self.id, "worker started");
        loop {
            let event = match state {
                WorkerState::Acquiring => self.acquire(&mut lease).await,
                WorkerState::Running => match lease.as_ref() {
                    Some(held) => {
                        stats.leases += 1;
                        WorkerEvent::RunEnded(self.run_leased(held, &mut stats).await)
                    }
                    None => WorkerEvent::RunEnded(RunExit::AccountIneligible),
                },
                WorkerState::Releasing { .. } => {
                    if let Some(held) = lease.take() {
                        self.pool.release(held.account());
                    }
                    WorkerEvent::Released {
                        shutdown: self.cancel.is_cancelled(),
                        exhausted: self.queue.is_exhausted().await,
                    }
                }
                WorkerState::Terminated => break,
            };

            let (next, action) = transition(state, event);
            debug!(worker = self.id, ?state, ?event, ?next, ?action, "worker transition");
            state = next;

            if action == WorkerAction::Backoff {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.backoff) => {}
                }
            }
        }

        info!(
            worker = self.id,
            leases = stats.leases,
            resolved = stats.resolved,
            not_found = stats.not_found,
            dropped = stats.dropped,
            failed = stats.failed,
            "worker terminated"
        );
        stats
    }

    async fn acquire(&self, slot: &mut Option<Lease>) -> WorkerEvent {
        if self.cancel.is_cancelled() {
            return WorkerEvent::Cancelled;
        }
        if self.queue.is_exhausted().await {
            return WorkerEvent::QueueExhausted;
        }
        match self.pool.lease().await {
            Some(lease) => {
                info!(worker = self.id, account_id = lease.id(), "account leased");
                *slot = Some(lease);
                WorkerEvent::Leased
            }
            None => {
                let depleted = self.pool.is_depleted();
                if depleted {
                    warn!(worker = self.id, "every account is banned, no lease possible");
                } else {
                    debug!(
                        worker = self.id,
                        backoff_secs = self.backoff.as_secs(),
                        "no eligible account, backing off"
                    );
                }
                WorkerEvent::NoAccount { depleted }
            }
        }
    }

    async fn run_leased(&self, lease: &Lease, stats: &mut WorkerStats) -> RunExit {
        let account = lease.account();
        let session = match self.pool.open_session(account).await {
            Ok(session) => session,
            Err(e) => {
                let class = classify(&e);
                warn!(
                    worker = self.id,
                    account_id = account.id(),
                    class = class.label(),
                    error = %e,
                    "failed to open session"
                );
                self.penalize(lease, class).await;
                return RunExit::SessionFailed(class);
            }
        };

        loop {
            let key = match self.queue.next(&self.cancel).await {
                Pulled::Task(key) => key,
                Pulled::Closed => return RunExit::QueueClosed,
                Pulled::Cancelled => return RunExit::Cancelled,
            };
            if key.is_empty() {
                continue;
            }

            if !self.pool.is_eligible(account) {
                warn!(
                    worker = self.id,
                    account_id = account.id(),
                    task = %key,
                    "account no longer eligible, dropping task"
                );
                metrics::record_task(TaskOutcome::Dropped);
                stats.dropped += 1;
                return RunExit::AccountIneligible;
            }

            if let Some(exit) = self.dispatch(lease, session.as_ref(), &key, stats).await {
                return exit;
            }
        }
    }

    /// Resolve one key. Returns `Some` when RUNNING must end.
    async fn dispatch(
        &self,
        lease: &Lease,
        session: &dyn SessionHandle,
        key: &str,
        stats: &mut WorkerStats,
    ) -> Option<RunExit> {
        let started = Instant::now();
        let result = session.resolve(key).await;
        metrics::record_resolve_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(Some(record)) => {
                if let Err(e) = self.results.submit(record).await {
                    error!(worker = self.id, task = %key, error = %e, "result sink rejected record");
                    metrics::record_task(TaskOutcome::Failed);
                    stats.failed += 1;
                    return Some(RunExit::SinkClosed);
                }
                debug!(worker = self.id, account_id = lease.id(), task = %key, "task resolved");
                metrics::record_task(TaskOutcome::Resolved);
                stats.resolved += 1;
                None
            }
            Ok(None) => {
                debug!(worker = self.id, task = %key, "no entity for key");
                metrics::record_task(TaskOutcome::NotFound);
                stats.not_found += 1;
                None
            }
            Err(e) => {
                let class = classify(&e);
                metrics::record_dispatch_failure(class);
                metrics::record_task(TaskOutcome::Failed);
                stats.failed += 1;
                warn!(
                    worker = self.id,
                    account_id = lease.id(),
                    task = %key,
                    class = class.label(),
                    error = %e,
                    "task failed"
                );
                match class {
                    FailureClass::Transient => None,
                    FailureClass::Throttle(_) | FailureClass::Banned => {
                        self.penalize(lease, class).await;
                        Some(RunExit::Evicted(class))
                    }
                }
            }
        }
    }

    async fn penalize(&self, lease: &Lease, class: FailureClass) {
        match class {
            FailureClass::Throttle(secs) => self.pool.mark_throttled(lease.account(), secs).await,
            FailureClass::Banned => self.pool.mark_banned(lease.account()).await,
            FailureClass::Transient => {}
        }
    }
}
