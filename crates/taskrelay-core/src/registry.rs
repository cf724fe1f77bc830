//! In-flight task tracking.

use std::sync::Arc;

use dashmap::DashMap;
use taskrelay_traits::{DelegatedTask, DispatchHooks, TaskStatus};
use tracing::{debug, warn};

/// Tracks tasks owned by running dispatch calls.
///
/// Entries are keyed by task id and only ever removed by the
/// [`TaskRegistration`] that created them, so cleanup happens exactly once on
/// every exit path.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, DelegatedTask>>,
    hooks: Arc<dyn DispatchHooks>,
}

impl TaskRegistry {
    pub fn new(hooks: Arc<dyn DispatchHooks>) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            hooks,
        }
    }

    /// Start tracking a task. Dropping the returned guard stops tracking it.
    pub fn register(&self, task: DelegatedTask) -> TaskRegistration {
        let id = task.id.clone();
        if self.tasks.insert(id.clone(), task).is_some() {
            warn!(task_id = %id, "Task id registered twice");
        }
        debug!(task_id = %id, "Task registered");
        TaskRegistration {
            registry: self.clone(),
            id,
        }
    }

    pub fn get(&self, id: &str) -> Option<DelegatedTask> {
        self.tasks.get(id).map(|entry| entry.clone())
    }

    pub fn list(&self) -> Vec<DelegatedTask> {
        self.tasks.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Move a task forward. Backward transitions are ignored.
    pub fn update_status(&self, id: &str, status: TaskStatus) -> bool {
        match self.tasks.get_mut(id) {
            Some(mut task) => task.advance(status),
            None => false,
        }
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut DelegatedTask)) {
        if let Some(mut task) = self.tasks.get_mut(id) {
            apply(&mut task);
        }
    }

    fn release(&self, id: &str) {
        if let Some((_, task)) = self.tasks.remove(id) {
            debug!(task_id = %id, status = task.status.as_str(), "Task released");
            self.hooks.on_task_released(&task);
        }
    }
}

/// Ownership of one registry entry.
pub struct TaskRegistration {
    registry: TaskRegistry,
    id: String,
}

impl TaskRegistration {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_status(&self, status: TaskStatus) -> bool {
        self.registry.update_status(&self.id, status)
    }

    pub fn set_session(&self, session_id: &str) {
        self.registry
            .update(&self.id, |task| task.session_id = Some(session_id.to_string()));
    }

    /// Record an error and move to `Error`.
    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        self.registry.update(&self.id, |task| {
            if task.advance(TaskStatus::Error) {
                task.error = Some(error);
            }
        });
    }
}

impl Drop for TaskRegistration {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}
