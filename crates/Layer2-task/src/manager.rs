//! Task Manager - registry of running tasks
//!
//! Features:
//! - Monotonic task ids starting at 1, never reused
//! - Lookup of live tasks by id
//! - Idempotent deletion with deletion listeners
//!
//! The manager is instance-scoped: every service owns its own registry.

use crate::process::ProcessHandle;
use crate::state::TaskState;
use crate::task::TaskSpecification;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use taskforge_foundation::{Result, TaskId, TaskInfo};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Called with every task removed from the registry
pub type DeleteListener = Arc<dyn Fn(&RunningTask) + Send + Sync>;

// ============================================================================
// Task resources
// ============================================================================

/// Background work owned by a task, released when the task is deleted
#[derive(Debug, Default)]
pub struct TaskResources {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    disposed: bool,
}

impl TaskResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled on dispose
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn track(&mut self, handle: JoinHandle<()>) {
        if self.disposed {
            handle.abort();
        } else {
            self.handles.push(handle);
        }
    }

    /// Cancel and abort everything tracked; safe to call more than once
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

// ============================================================================
// Running task
// ============================================================================

/// A spawned task, owned by the [`TaskManager`] until it is deleted
pub struct RunningTask {
    id: TaskId,
    specification: Arc<TaskSpecification>,
    process: Arc<dyn ProcessHandle>,
    state: RwLock<TaskState>,
    kill_requested: AtomicBool,
    resources: Mutex<TaskResources>,
    started_at: DateTime<Utc>,
}

impl RunningTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn specification(&self) -> &Arc<TaskSpecification> {
        &self.specification
    }

    pub fn label(&self) -> &str {
        &self.specification.label
    }

    pub fn process(&self) -> &Arc<dyn ProcessHandle> {
        &self.process
    }

    pub fn state(&self) -> TaskState {
        *self.state.read()
    }

    /// Move to `next`; illegal transitions are ignored and reported
    pub fn set_state(&self, next: TaskState) -> bool {
        let mut state = self.state.write();
        if state.can_transition_to(next) {
            debug!(task_id = %self.id, from = %*state, to = %next, "Task state change");
            *state = next;
            true
        } else {
            warn!(task_id = %self.id, from = %*state, to = %next, "Ignored task state change");
            false
        }
    }

    /// Record the kill request and signal the process
    pub fn request_kill(&self) -> Result<()> {
        self.kill_requested.store(true, Ordering::SeqCst);
        self.process.kill()
    }

    pub fn kill_requested(&self) -> bool {
        self.kill_requested.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Info handed back to the caller of a run
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            task_id: self.id,
            os_process_id: self.process.pid(),
            terminal_id: self.process.terminal_id(),
            process_id: self.process.process_id(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.resources.lock().cancel_token()
    }

    pub fn track(&self, handle: JoinHandle<()>) {
        self.resources.lock().track(handle);
    }

    pub fn dispose(&self) {
        self.resources.lock().dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.resources.lock().is_disposed()
    }
}

impl std::fmt::Debug for RunningTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningTask")
            .field("id", &self.id)
            .field("label", &self.specification.label)
            .field("state", &self.state())
            .field("process_id", &self.process.process_id())
            .finish()
    }
}

// ============================================================================
// Task manager
// ============================================================================

pub struct TaskManager {
    next_id: AtomicU64,
    tasks: RwLock<BTreeMap<TaskId, Arc<RunningTask>>>,
    listeners: RwLock<Vec<DeleteListener>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a spawned process under the next task id
    pub fn register(
        &self,
        specification: Arc<TaskSpecification>,
        process: Arc<dyn ProcessHandle>,
    ) -> Arc<RunningTask> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let task = Arc::new(RunningTask {
            id,
            specification,
            process,
            state: RwLock::new(TaskState::Running),
            kill_requested: AtomicBool::new(false),
            resources: Mutex::new(TaskResources::new()),
            started_at: Utc::now(),
        });

        self.tasks.write().insert(id, Arc::clone(&task));
        debug!(task_id = %id, label = %task.label(), "Task registered");
        task
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<RunningTask>> {
        self.tasks.read().get(&id).cloned()
    }

    /// Remove a task; listeners fire only when something was removed
    pub fn delete(&self, id: TaskId) -> bool {
        let removed = self.tasks.write().remove(&id);
        let Some(task) = removed else {
            return false;
        };

        debug!(task_id = %id, "Task deleted");
        let listeners: Vec<DeleteListener> = self.listeners.read().clone();
        for listener in listeners {
            listener(&task);
        }
        true
    }

    pub fn on_delete<F>(&self, listener: F)
    where
        F: Fn(&RunningTask) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Ids of all registered tasks, ascending
    pub fn running_ids(&self) -> Vec<TaskId> {
        self.tasks.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Handle that records kill requests
    #[derive(Default)]
    struct StubProcess {
        kills: AtomicUsize,
    }

    impl ProcessHandle for StubProcess {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        fn process_id(&self) -> u64 {
            9
        }

        fn kill(&self) -> Result<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn write_input(&self, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    fn register(manager: &TaskManager, label: &str) -> Arc<RunningTask> {
        manager.register(
            Arc::new(TaskSpecification::new(label, "/bin/true")),
            Arc::new(StubProcess::default()),
        )
    }

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let manager = TaskManager::new();
        let a = register(&manager, "a");
        let b = register(&manager, "b");
        assert_eq!(a.id(), TaskId(1));
        assert_eq!(b.id(), TaskId(2));

        manager.delete(a.id());
        let c = register(&manager, "c");
        assert_eq!(c.id(), TaskId(3));
        assert_eq!(manager.running_ids(), vec![TaskId(2), TaskId(3)]);
    }

    #[test]
    fn test_started_at_set_on_register() {
        let manager = TaskManager::new();
        let before = Utc::now();
        let task = register(&manager, "a");
        assert!(task.started_at() >= before);
        assert!(task.started_at() <= Utc::now());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let manager = TaskManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        manager.on_delete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let task = register(&manager, "a");
        assert!(manager.delete(task.id()));
        assert!(!manager.delete(task.id()));
        assert!(!manager.delete(TaskId(99)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(manager.get(task.id()).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_listener_disposes_resources() {
        let manager = TaskManager::new();
        manager.on_delete(|task| task.dispose());

        let task = register(&manager, "a");
        let token = task.cancel_token();
        manager.delete(task.id());
        assert!(token.is_cancelled());
        assert!(task.is_disposed());
    }

    #[test]
    fn test_request_kill_and_info() {
        let manager = TaskManager::new();
        let process = Arc::new(StubProcess::default());
        let task = manager.register(
            Arc::new(TaskSpecification::new("a", "/bin/true")),
            process.clone(),
        );

        assert!(!task.kill_requested());
        task.request_kill().unwrap();
        task.request_kill().unwrap();
        assert!(task.kill_requested());
        assert_eq!(process.kills.load(Ordering::SeqCst), 2);
        // kill never moves the state by itself
        assert_eq!(task.state(), TaskState::Running);

        let info = task.info();
        assert_eq!(info.task_id, task.id());
        assert_eq!(info.os_process_id, Some(4242));
        assert_eq!(info.terminal_id, None);
        assert_eq!(info.process_id, 9);
    }

    #[test]
    fn test_state_transitions_guarded() {
        let manager = TaskManager::new();
        let task = register(&manager, "a");
        assert!(task.set_state(TaskState::Killed));
        assert!(!task.set_state(TaskState::Exited));
        assert_eq!(task.state(), TaskState::Killed);
    }
}
