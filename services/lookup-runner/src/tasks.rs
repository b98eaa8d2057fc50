//! Task input and the shared task queue
//!
//! The queue is one bounded mpsc channel whose receiver is shared by every
//! worker behind an async mutex, so each task reaches exactly one worker.
//! The producer closes the channel when it stops and separately raises a
//! one-shot "finished" flag; together they let a worker tell "nothing queued
//! yet" apart from "nothing will ever be queued again".

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Read the task list: one key per line, trimmed, blanks skipped, a leading
/// `@` stripped.
pub async fn load_tasks(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::ReadInput {
            path: path.to_path_buf(),
            source,
        })?;
    let tasks = parse_tasks(&contents);
    info!(path = %path.display(), tasks = tasks.len(), "loaded task list");
    Ok(tasks)
}

fn parse_tasks(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.trim().trim_start_matches('@').trim())
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

/// Result of waiting on the queue.
#[derive(Debug, PartialEq, Eq)]
pub enum Pulled {
    Task(String),
    /// The channel is closed and drained
    Closed,
    Cancelled,
}

/// Producer side. Dropping it closes the channel.
pub struct TaskSender {
    tx: mpsc::Sender<String>,
    finished: watch::Sender<bool>,
}

/// Consumer side, cloned into every worker.
#[derive(Clone)]
pub struct TaskQueue {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    finished: watch::Receiver<bool>,
}

pub fn channel(capacity: usize) -> (TaskSender, TaskQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (finished_tx, finished_rx) = watch::channel(false);
    (
        TaskSender {
            tx,
            finished: finished_tx,
        },
        TaskQueue {
            rx: Arc::new(Mutex::new(rx)),
            finished: finished_rx,
        },
    )
}

impl TaskQueue {
    /// Wait for the next task. Suspends until a task arrives, the channel
    /// closes or `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Pulled {
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Pulled::Cancelled,
            rx = self.rx.lock() => rx,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Pulled::Cancelled,
            task = rx.recv() => match task {
                Some(task) => Pulled::Task(task),
                None => Pulled::Closed,
            },
        }
    }

    pub fn producer_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// True once the producer has finished and the channel is confirmed
    /// closed and empty. Never consumes a task.
    pub async fn is_exhausted(&self) -> bool {
        if !self.producer_finished() {
            return false;
        }
        let rx = self.rx.lock().await;
        rx.is_closed() && rx.is_empty()
    }
}

/// Feed `tasks` into the queue, one per `interval`.
///
/// Stops early on cancellation. On every exit path the channel is closed and
/// the finished flag raised. Returns the number of tasks enqueued.
pub async fn produce(
    tasks: Vec<String>,
    sender: TaskSender,
    interval: Duration,
    cancel: CancellationToken,
) -> usize {
    let TaskSender { tx, finished } = sender;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let total = tasks.len();
    let mut sent = 0usize;

    for task in tasks {
        if task.is_empty() {
            continue;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(sent, total, "producer cancelled");
                break;
            }
            res = tx.send(task) => {
                if res.is_err() {
                    warn!(sent, "task queue receiver dropped, producer stopping");
                    break;
                }
                sent += 1;
                debug!(sent, total, "task enqueued");
            }
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(sent, total, "producer cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }
    }

    drop(tx);
    finished.send_replace(true);
    info!(sent, total, "producer finished, task queue closed");
    sent
}
