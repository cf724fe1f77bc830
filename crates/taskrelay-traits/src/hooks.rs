//! Dispatch extension points.
//!
//! The set of lifecycle events is small and fixed, so hooks are plain trait
//! methods with no-op defaults rather than a named-event bus. Hooks run
//! inline on the dispatching task and must not block.

use serde::Serialize;

use crate::model::{ModelCandidate, Provenance};
use crate::task::{DelegatedTask, TaskMetadata, TaskOutcome};

/// Execution mode chosen for a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Sync,
    Background,
    /// Synchronous call rerouted through a background launch
    SupervisedBackground,
    SyncContinuation,
    BackgroundContinuation,
}

/// What is about to be dispatched.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchPlan {
    pub mode: DispatchMode,
    pub description: String,
    pub agent: String,
    pub category: Option<String>,
    pub model: Option<ModelCandidate>,
    pub provenance: Option<Provenance>,
    /// Existing session for continuations
    pub session_id: Option<String>,
}

/// One completed poll iteration.
#[derive(Debug, Clone, Serialize)]
pub struct PollTick {
    pub session_id: String,
    pub iteration: u32,
    pub elapsed_ms: u64,
    /// Message count observed this tick, when history was fetched
    pub message_count: Option<usize>,
    pub session_busy: bool,
}

pub trait DispatchHooks: Send + Sync {
    fn before_dispatch(&self, _plan: &DispatchPlan) {}

    fn after_dispatch(&self, _metadata: &TaskMetadata, _outcome: TaskOutcome) {}

    fn on_poll_tick(&self, _tick: &PollTick) {}

    /// A tracked task left the registry. Fired exactly once per task.
    fn on_task_released(&self, _task: &DelegatedTask) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl DispatchHooks for NoopHooks {}
