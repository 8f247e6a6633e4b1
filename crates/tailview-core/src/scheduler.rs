//! Periodic task scheduling.
//!
//! Every derived source owns exactly one periodic task. The callback does a
//! bounded amount of work and returns how long to wait before it runs again.
//! Schedulers are constructed explicitly and handed to each source; there is
//! no process-wide instance.
//!
//! - [`TokioTaskScheduler`] runs callbacks on a tokio runtime.
//! - [`ManualTaskScheduler`] runs them only when [`ManualTaskScheduler::run_once`]
//!   is called, which makes source behaviour deterministic in tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Work done on every tick; returns the delay until the next tick.
///
/// The token is cancelled when the task is stopped. Long ticks should check
/// it between chunks of work and return early once it is cancelled.
pub type PeriodicCallback = Box<dyn FnMut(&CancellationToken) -> Duration + Send>;

/// Handle of a running periodic task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeriodicTask {
    id: u64,
    name: Arc<str>,
}

impl PeriodicTask {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Starts and stops periodic tasks.
pub trait TaskScheduler: Send + Sync {
    fn start_periodic(&self, name: &str, callback: PeriodicCallback) -> PeriodicTask;

    /// Stops a task. Returns `false` if it was not running.
    fn stop_periodic(&self, task: &PeriodicTask) -> bool;
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

fn next_task(name: &str) -> PeriodicTask {
    PeriodicTask {
        id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
        name: Arc::from(name),
    }
}

// ---------------------------------------------------------------------------
// Tokio
// ---------------------------------------------------------------------------

/// Runs every periodic task as a tokio task.
pub struct TokioTaskScheduler {
    handle: tokio::runtime::Handle,
    root: CancellationToken,
    tasks: Mutex<HashMap<u64, CancellationToken>>,
}

impl TokioTaskScheduler {
    /// Scheduler spawning onto the given runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            root: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Scheduler spawning onto the runtime of the calling context.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Number of tasks currently registered.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Stops every task, including ones started afterwards.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.tasks.lock().clear();
    }
}

impl TaskScheduler for TokioTaskScheduler {
    fn start_periodic(&self, name: &str, mut callback: PeriodicCallback) -> PeriodicTask {
        let task = next_task(name);
        let token = self.root.child_token();
        self.tasks.lock().insert(task.id, token.clone());

        let task_name = task.name.clone();
        self.handle.spawn(async move {
            tracing::debug!(task = %task_name, "periodic task started");
            loop {
                if token.is_cancelled() {
                    break;
                }
                let delay = callback(&token);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            tracing::debug!(task = %task_name, "periodic task stopped");
        });
        task
    }

    fn stop_periodic(&self, task: &PeriodicTask) -> bool {
        match self.tasks.lock().remove(&task.id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioTaskScheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

// ---------------------------------------------------------------------------
// Manual
// ---------------------------------------------------------------------------

type SharedCallback = Arc<Mutex<PeriodicCallback>>;

struct ManualEntry {
    task: PeriodicTask,
    token: CancellationToken,
    callback: SharedCallback,
}

/// Runs periodic tasks only on demand, ignoring their requested delays.
#[derive(Default)]
pub struct ManualTaskScheduler {
    entries: Mutex<Vec<ManualEntry>>,
}

impl ManualTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every registered task once, in registration order. Returns how
    /// many tasks ran.
    pub fn run_once(&self) -> usize {
        // Snapshot so callbacks may start or stop tasks themselves.
        let snapshot: Vec<(CancellationToken, SharedCallback)> = self
            .entries
            .lock()
            .iter()
            .map(|entry| (entry.token.clone(), entry.callback.clone()))
            .collect();

        let mut ran = 0;
        for (token, callback) in snapshot {
            if token.is_cancelled() {
                continue;
            }
            let mut callback = callback.lock();
            (*callback)(&token);
            ran += 1;
        }
        ran
    }

    /// Runs every task `times` times.
    pub fn run(&self, times: usize) {
        for _ in 0..times {
            self.run_once();
        }
    }

    pub fn task_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.task.name().to_string())
            .collect()
    }
}

impl TaskScheduler for ManualTaskScheduler {
    fn start_periodic(&self, name: &str, callback: PeriodicCallback) -> PeriodicTask {
        let task = next_task(name);
        self.entries.lock().push(ManualEntry {
            task: task.clone(),
            token: CancellationToken::new(),
            callback: Arc::new(Mutex::new(callback)),
        });
        task
    }

    fn stop_periodic(&self, task: &PeriodicTask) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|entry| entry.task.id == task.id) {
            Some(position) => {
                let entry = entries.remove(position);
                entry.token.cancel();
                true
            }
            None => false,
        }
    }
}
