//! Background task registry.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::Result;

/// Identifier of a registered task, unique within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{:04}", self.0)
    }
}

/// Observed status of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Running and not asked to stop.
    Running,
    /// Asked to stop, still running.
    Cancelling,
    /// Stopped after cancellation was requested.
    Cancelled,
    /// Finished on its own before any cancellation request.
    Completed,
}

impl TaskStatus {
    /// Whether the task has stopped executing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Cancelled | TaskStatus::Completed)
    }
}

/// Caller-side handle to a registered task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    name: String,
    token: CancellationToken,
}

impl TaskHandle {
    /// The task's registry ID.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The name given at spawn time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cancellation of this task only. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct TaskEntry {
    id: TaskId,
    name: String,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskEntry {
    fn status(&self) -> TaskStatus {
        match (self.join.is_finished(), self.token.is_cancelled()) {
            (false, false) => TaskStatus::Running,
            (false, true) => TaskStatus::Cancelling,
            (true, true) => TaskStatus::Cancelled,
            (true, false) => TaskStatus::Completed,
        }
    }
}

/// Tracks every background task the engine spawns.
///
/// Cancellation is cooperative: each task receives a [`CancellationToken`]
/// and is expected to return soon after it fires. [`cancel_all`] only
/// requests cancellation; [`all_cancelled`] reports when every task has
/// actually stopped.
///
/// [`cancel_all`]: TaskRegistry::cancel_all
/// [`all_cancelled`]: TaskRegistry::all_cancelled
pub struct TaskRegistry {
    tasks: Mutex<Vec<TaskEntry>>,
    next_id: AtomicU64,
    draining: AtomicBool,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            draining: AtomicBool::new(false),
        }
    }

    /// Spawn `work` onto the current tokio runtime and register it.
    ///
    /// The task is recorded before this returns, so a later
    /// [`cancel_all`](Self::cancel_all) always reaches it. Spawning after
    /// `cancel_all` hands the task an already-cancelled token.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, work: F) -> Result<TaskHandle>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            EngineError::Runtime(format!("no async runtime to spawn task '{}'", name))
        })?;

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();

        // Caller code runs outside the lock: it may spawn children or panic.
        let fut = work(token.clone());

        let mut tasks = self.tasks.lock().map_err(|_| EngineError::LockPoisoned)?;
        if self.draining.load(Ordering::SeqCst) {
            debug!(task = %id, name = %name, "spawned while draining, cancelling immediately");
            token.cancel();
        }

        let join = runtime.spawn(fut);
        tasks.push(TaskEntry {
            id,
            name: name.clone(),
            token: token.clone(),
            join,
        });
        debug!(task = %id, name = %name, "task registered");

        Ok(TaskHandle { id, name, token })
    }

    /// Request cancellation of every registered task.
    ///
    /// Tasks that already stopped or were already asked to stop are left
    /// alone. Does not wait. Returns the number of tasks newly cancelled.
    pub fn cancel_all(&self) -> Result<usize> {
        let tasks = self.tasks.lock().map_err(|_| EngineError::LockPoisoned)?;
        self.draining.store(true, Ordering::SeqCst);

        let mut cancelled = 0;
        for entry in tasks.iter() {
            if entry.join.is_finished() || entry.token.is_cancelled() {
                continue;
            }
            entry.token.cancel();
            cancelled += 1;
            debug!(task = %entry.id, name = %entry.name, "cancellation requested");
        }
        Ok(cancelled)
    }

    /// Whether every registered task has stopped.
    pub fn all_cancelled(&self) -> Result<bool> {
        let tasks = self.tasks.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(tasks.iter().all(|entry| entry.join.is_finished()))
    }

    /// Status of one task, or `None` if the ID is unknown.
    ///
    /// Reads through a poisoned lock; entries stay consistent because no
    /// caller code runs while it is held.
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.iter().find(|e| e.id == id).map(TaskEntry::status)
    }

    /// Snapshot of every task's ID, name, and status.
    pub fn statuses(&self) -> Result<Vec<(TaskId, String, TaskStatus)>> {
        let tasks = self.tasks.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(tasks
            .iter()
            .map(|e| (e.id, e.name.clone(), e.status()))
            .collect())
    }

    /// Names of tasks that have not stopped yet.
    pub fn pending(&self) -> Result<Vec<String>> {
        let tasks = self.tasks.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(tasks
            .iter()
            .filter(|e| !e.join.is_finished())
            .map(|e| e.name.clone())
            .collect())
    }

    /// Number of registered tasks. Reads through a poisoned lock.
    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no task is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`cancel_all`](Self::cancel_all) has been called.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Remove every entry, aborting tasks that have not stopped.
    ///
    /// Returns the number of tasks abandoned this way.
    pub fn teardown(&self) -> Result<usize> {
        let mut tasks = self.tasks.lock().map_err(|_| EngineError::LockPoisoned)?;

        let mut abandoned = 0;
        for entry in tasks.drain(..) {
            if !entry.join.is_finished() {
                warn!(task = %entry.id, name = %entry.name, "abandoning task that ignored cancellation");
                entry.join.abort();
                abandoned += 1;
            }
        }
        Ok(abandoned)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
