//! A small cooperative scheduler for the background jobs (expiration sweep, payment
//! reconciliation).
//!
//! A single poll loop wakes every ten seconds and dispatches every due task onto a [`JoinSet`],
//! so a slow task never blocks the loop or its peers, and everything in flight can be awaited on
//! shutdown. Failures back off exponentially and a task disables itself after too many
//! consecutive errors.
use std::{collections::HashMap, future::Future, pin::Pin, sync::{Arc, Mutex}, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use tokio::{sync::watch, task::JoinSet};

use crate::traits::ShopError;

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ERRORS: u32 = 3;
const BACKOFF_BASE_SECS: i64 = 30;
const BACKOFF_CAP_SECS: i64 = 300;

pub type TaskHandler = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), ShopError>> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Bookkeeping for one named periodic job.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: String,
    pub interval: Duration,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub error_count: u32,
    pub max_errors: u32,
    pub enabled: bool,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            // First run is due immediately
            next_run: Utc::now(),
            last_run: None,
            status: TaskStatus::Idle,
            error_count: 0,
            max_errors: DEFAULT_MAX_ERRORS,
            enabled: true,
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.status != TaskStatus::Running && self.next_run <= now
    }

    fn record_success(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.last_run = Some(now);
        self.error_count = 0;
        self.next_run = now + chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::seconds(60));
    }

    /// Capped exponential backoff. The task disables itself once the error budget is spent and
    /// stays disabled until someone re-enables it.
    fn record_failure(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.error_count += 1;
        let backoff = (BACKOFF_BASE_SECS << self.error_count.min(16)).min(BACKOFF_CAP_SECS);
        self.next_run = now + chrono::Duration::seconds(backoff);
        if self.error_count >= self.max_errors {
            self.enabled = false;
        }
    }
}

struct TaskEntry {
    task: ScheduledTask,
    handler: TaskHandler,
}

/// The scheduler. Register tasks, then hand the instance to [`run`](Self::run); `poll_tasks` is
/// public so callers (and tests) can drive a tick by hand.
pub struct TaskScheduler {
    tasks: Arc<Mutex<HashMap<String, TaskEntry>>>,
    jobs: JoinSet<()>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self { tasks: Arc::new(Mutex::new(HashMap::new())), jobs: JoinSet::new() }
    }

    pub fn add_task(&mut self, name: &str, interval: Duration, handler: TaskHandler) {
        self.add_task_with_budget(name, interval, DEFAULT_MAX_ERRORS, handler);
    }

    pub fn add_task_with_budget(&mut self, name: &str, interval: Duration, max_errors: u32, handler: TaskHandler) {
        let mut task = ScheduledTask::new(name, interval);
        task.max_errors = max_errors;
        debug!("⏲️ Registered task '{name}' every {interval:?}");
        let mut tasks = self.tasks.lock().unwrap();
        tasks.insert(name.to_string(), TaskEntry { task, handler });
    }

    /// A snapshot of one task's bookkeeping.
    pub fn task(&self, name: &str) -> Option<ScheduledTask> {
        self.tasks.lock().unwrap().get(name).map(|entry| entry.task.clone())
    }

    pub fn enable_task(&self, name: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(name) {
            Some(entry) => {
                entry.task.enabled = true;
                entry.task.error_count = 0;
                entry.task.status = TaskStatus::Idle;
                entry.task.next_run = Utc::now();
                info!("⏲️ Task '{name}' re-enabled");
                true
            },
            None => false,
        }
    }

    /// Forces a task to be due on the next poll.
    pub fn run_now(&self, name: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(name) {
            Some(entry) => {
                entry.task.next_run = Utc::now();
                true
            },
            None => false,
        }
    }

    /// Dispatches every due task as an independent job. Returns the names started this tick.
    pub fn poll_tasks(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut started = Vec::new();
        let due: Vec<(String, TaskHandler)> = {
            let mut tasks = self.tasks.lock().unwrap();
            tasks
                .iter_mut()
                .filter(|(_, entry)| entry.task.is_due(now))
                .map(|(name, entry)| {
                    entry.task.status = TaskStatus::Running;
                    (name.clone(), Arc::clone(&entry.handler))
                })
                .collect()
        };
        for (name, handler) in due {
            trace!("⏲️ Starting task '{name}'");
            started.push(name.clone());
            let tasks = Arc::clone(&self.tasks);
            self.jobs.spawn(async move {
                let result = (handler)().await;
                let finished_at = Utc::now();
                let mut tasks = tasks.lock().unwrap();
                let Some(entry) = tasks.get_mut(&name) else {
                    return;
                };
                match result {
                    Ok(()) => {
                        trace!("⏲️ Task '{name}' completed");
                        entry.task.record_success(finished_at);
                    },
                    Err(e) => {
                        let task = &mut entry.task;
                        task.record_failure(finished_at);
                        if task.enabled {
                            warn!(
                                "⏲️ Task '{name}' failed ({}/{}), retrying at {}: {e}",
                                task.error_count, task.max_errors, task.next_run
                            );
                        } else {
                            error!("⏲️ Task '{name}' disabled after {} consecutive failures: {e}", task.error_count);
                        }
                    },
                }
            });
        }
        started
    }

    /// Waits for every job dispatched so far to finish. Used by shutdown and tests.
    pub async fn drain(&mut self) {
        while self.jobs.join_next().await.is_some() {}
    }

    /// Runs the poll loop until `shutdown` fires, then waits for in-flight jobs.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("⏲️ Task scheduler started with {} tasks", self.tasks.lock().unwrap().len());
        let mut timer = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    // Reap jobs that finished since the last tick
                    while self.jobs.try_join_next().is_some() {}
                    self.poll_tasks(Utc::now());
                },
                changed = shutdown.changed() => {
                    // A dropped sender also means shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
            }
        }
        info!("⏲️ Task scheduler shutting down, waiting for in-flight jobs");
        self.drain().await;
        info!("⏲️ Task scheduler stopped");
    }
}
