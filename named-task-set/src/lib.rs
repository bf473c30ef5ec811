// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A bounded collection of named tokio tasks.
//!
//! Tasks execute in parallel up to a maximum amount of parallelism, each
//! under a hierarchical name (`<parent-task-name>-<name>`) carried in a
//! task-local so nested spawns compose for log correlation.  Joining
//! waits for every task even after the first failure, then reports an
//! aggregate error naming each failed task.  Cancellation is
//! cooperative: tasks that should be interruptible poll a [`StopToken`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// The default number of parallel tasks used by [NamedTaskSet].
pub const DEFAULT_MAX_PARALLELISM: usize = 50;

/// The default wall-clock cap for one [NamedTaskSet::join_all] batch.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(3600);

tokio::task_local! {
    static TASK_NAME: String;
}

/// The full hierarchical name of the calling task, if it was spawned
/// through a [NamedTaskSet].
pub fn current_task_name() -> Option<String> {
    TASK_NAME.try_with(|name| name.clone()).ok()
}

/// Cooperative stop signal handed to tasks that should be interruptible.
#[derive(Clone, Debug)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the stop is triggered.
    pub async fn stopped(&mut self) {
        // An error means the set was dropped, which also means stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[derive(Debug, Error)]
pub enum TaskSetError {
    #[error(
        "timed out after {timeout:?} waiting for {pending} task(s) to finish"
    )]
    Timeout { timeout: Duration, pending: usize },

    #[error("{} task(s) failed: {}", failures.len(),
        failures
            .iter()
            .map(|(name, err)| format!("{}: {}", name, err))
            .collect::<Vec<_>>()
            .join("; "))]
    TaskErrors { failures: Vec<(String, String)> },

    #[error("no finished task named {name:?}")]
    NoSuchResult { name: String },
}

/// A collection of named tokio tasks executing in parallel, bounded by a
/// semaphore the way a fixed-size worker pool is.
pub struct NamedTaskSet<T> {
    semaphore: Arc<Semaphore>,
    set: JoinSet<(String, Result<T, anyhow::Error>)>,
    task_names: HashMap<tokio::task::Id, String>,
    results: HashMap<String, T>,
    failures: Vec<(String, String)>,
    stop_tx: watch::Sender<bool>,
}

impl<T: Send + 'static> Default for NamedTaskSet<T> {
    fn default() -> Self {
        NamedTaskSet::new()
    }
}

impl<T: Send + 'static> NamedTaskSet<T> {
    pub fn new() -> NamedTaskSet<T> {
        Self::new_with_parallelism(DEFAULT_MAX_PARALLELISM)
    }

    pub fn new_with_parallelism(max_parallelism: usize) -> NamedTaskSet<T> {
        let (stop_tx, _) = watch::channel(false);
        NamedTaskSet {
            semaphore: Arc::new(Semaphore::new(max_parallelism)),
            set: JoinSet::new(),
            task_names: HashMap::new(),
            results: HashMap::new(),
            failures: Vec::new(),
            stop_tx,
        }
    }

    /// Spawn `future` under `name`.  The task starts executing as soon
    /// as the parallelism bound allows.  Results are keyed by the name
    /// given here; spawning two tasks under one name keeps the later
    /// result.
    pub fn spawn<F>(&mut self, name: &str, future: F)
    where
        F: Future<Output = Result<T, anyhow::Error>> + Send + 'static,
    {
        let raw_name = name.to_string();
        let full_name = compose_name(current_task_name().as_deref(), name);
        let semaphore = Arc::clone(&self.semaphore);
        let handle = self.set.spawn(TASK_NAME.scope(full_name, {
            let raw_name = raw_name.clone();
            async move {
                // Hold the permit until the task finishes executing.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                (raw_name, future.await)
            }
        }));
        self.task_names.insert(handle.id(), raw_name);
    }

    /// Hand out a cooperative stop token for a task about to be spawned.
    pub fn stop_token(&self) -> StopToken {
        StopToken { rx: self.stop_tx.subscribe() }
    }

    /// Flip every outstanding [`StopToken`].
    pub fn trigger_stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Wait for every task.  The first failure does not interrupt the
    /// rest; once everything has finished, all failures are raised
    /// together, named.  On timeout the stop tokens are triggered and
    /// the remaining tasks are abandoned.
    pub async fn join_all(
        &mut self,
        timeout: Duration,
    ) -> Result<(), TaskSetError> {
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = self.set.join_next_with_id().await {
                match joined {
                    Ok((id, (name, Ok(value)))) => {
                        self.task_names.remove(&id);
                        self.results.insert(name, value);
                    }
                    Ok((id, (name, Err(error)))) => {
                        self.task_names.remove(&id);
                        self.failures.push((name, format!("{:#}", error)));
                    }
                    Err(join_error) => {
                        let name = self
                            .task_names
                            .remove(&join_error.id())
                            .unwrap_or_else(|| "<unknown>".to_string());
                        self.failures
                            .push((name, join_error.to_string()));
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            self.trigger_stop();
            return Err(TaskSetError::Timeout {
                timeout,
                pending: self.set.len(),
            });
        }

        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(TaskSetError::TaskErrors {
                failures: std::mem::take(&mut self.failures),
            })
        }
    }

    /// The value returned by the completed task spawned under `name`.
    pub fn get_result(&self, name: &str) -> Result<&T, TaskSetError> {
        self.results
            .get(name)
            .ok_or_else(|| TaskSetError::NoSuchResult { name: name.into() })
    }

    /// Consume the set, yielding every successful `(name, value)`.
    pub fn into_results(self) -> HashMap<String, T> {
        self.results
    }
}

// `scan-subcloud1` spawned from task `scan` must not become
// `scan-scan-subcloud1`, and re-spawning under an already-present
// component keeps the parent name as-is.
fn compose_name(parent: Option<&str>, name: &str) -> String {
    match parent {
        None => name.to_string(),
        Some(parent) => {
            if parent.split('-').any(|component| component == name) {
                parent.to_string()
            } else {
                format!("{}-{}", parent, name)
            }
        }
    }
}
