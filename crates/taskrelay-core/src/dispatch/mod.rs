//! Task dispatch: validates a delegation request, picks agent and model, and
//! runs it synchronously, in the background, or as a continuation of an
//! existing session.

mod args;
mod background;
mod continuation;
mod permissions;
pub mod report;
mod selection;
mod supervised;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use taskrelay_traits::{
    AvailabilitySource, BackgroundManager, DelegateError, DispatchHooks, DispatchMode,
    DispatchPlan, NoopHooks, Result, SessionBackend, TaskMetadata, TaskOutcome, TaskReport,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::availability::StaticAvailability;
use crate::catalog::Catalog;
use crate::config::DelegateConfig;
use crate::registry::TaskRegistry;
use crate::session::CompletionPoller;

pub use args::{DelegateTaskArgs, TaskTarget, ValidatedArgs};
pub use permissions::tool_permissions;
pub use selection::{ModelSelection, select_model};

/// The delegating session.
#[derive(Debug, Clone, Default)]
pub struct ParentContext {
    pub session_id: String,
    /// Working directory child sessions are scoped to
    pub directory: String,
    /// Agent running the parent session
    pub agent: Option<String>,
    /// Model explicitly selected in the UI for this request
    pub ui_selected_model: Option<String>,
}

/// A new task with its agent and model chosen.
struct NewTask {
    description: String,
    prompt: String,
    selection: ModelSelection,
}

impl NewTask {
    fn metadata(&self, run_in_background: bool) -> TaskMetadata {
        TaskMetadata {
            title: self.description.clone(),
            agent: self.selection.agent.name.clone(),
            category: self
                .selection
                .category
                .as_ref()
                .map(|category| category.name.clone()),
            model: self.selection.model.as_ref().map(|model| model.full_id()),
            provenance: self.selection.provenance(),
            run_in_background,
            ..Default::default()
        }
    }

    fn plan(&self, mode: DispatchMode) -> DispatchPlan {
        DispatchPlan {
            mode,
            description: self.description.clone(),
            agent: self.selection.agent.name.clone(),
            category: self
                .selection
                .category
                .as_ref()
                .map(|category| category.name.clone()),
            model: self.selection.model.clone(),
            provenance: self.selection.provenance(),
            session_id: None,
        }
    }
}

fn new_task_id() -> String {
    format!("task_{}", uuid::Uuid::new_v4().simple())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Runs delegated tasks against a session backend.
pub struct TaskDispatcher {
    config: DelegateConfig,
    catalog: Catalog,
    backend: Arc<dyn SessionBackend>,
    background: Arc<dyn BackgroundManager>,
    availability: Arc<dyn AvailabilitySource>,
    hooks: Arc<dyn DispatchHooks>,
    registry: TaskRegistry,
}

impl TaskDispatcher {
    pub fn new(
        config: DelegateConfig,
        backend: Arc<dyn SessionBackend>,
        background: Arc<dyn BackgroundManager>,
    ) -> Self {
        let hooks: Arc<dyn DispatchHooks> = Arc::new(NoopHooks);
        Self {
            catalog: Catalog::from_config(&config),
            config,
            backend,
            background,
            availability: Arc::new(StaticAvailability::default()),
            registry: TaskRegistry::new(hooks.clone()),
            hooks,
        }
    }

    pub fn with_availability(mut self, availability: Arc<dyn AvailabilitySource>) -> Self {
        self.availability = availability;
        self
    }

    /// Install dispatch hooks. Tasks registered before this call keep the
    /// previous hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn DispatchHooks>) -> Self {
        self.registry = TaskRegistry::new(hooks.clone());
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &DelegateConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// In-flight synchronous tasks, for progress queries.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    fn poller(&self, budget: Duration) -> CompletionPoller<'_> {
        CompletionPoller::new(
            self.backend.as_ref(),
            self.hooks.as_ref(),
            self.config.polling.poll_interval(),
            budget,
        )
    }

    /// Run one delegation request.
    ///
    /// Abort and timeout come back as successful reports with the matching
    /// [`TaskOutcome`]; errors are reserved for requests that could not run.
    pub async fn execute(
        &self,
        args: &DelegateTaskArgs,
        parent: &ParentContext,
        cancel: &CancellationToken,
    ) -> Result<TaskReport> {
        let started = Instant::now();
        let result = self.dispatch(args, parent, cancel, started).await;

        match &result {
            Ok(report) => {
                info!(
                    outcome = ?report.outcome,
                    session_id = report.metadata.session_id.as_deref(),
                    duration_ms = elapsed_ms(started),
                    "Dispatch finished"
                );
                self.hooks.after_dispatch(&report.metadata, report.outcome);
            }
            Err(e) => {
                warn!(error = %e, description = %args.description, "Dispatch failed");
                let metadata = TaskMetadata {
                    title: args.description.trim().to_string(),
                    session_id: e.session_id().map(str::to_string),
                    agent: args.subagent_type.clone().unwrap_or_default(),
                    category: args.category.clone(),
                    run_in_background: args.run_in_background.unwrap_or(false),
                    duration_ms: Some(elapsed_ms(started)),
                    ..Default::default()
                };
                self.hooks.after_dispatch(&metadata, TaskOutcome::Failed);
            }
        }

        result
    }

    async fn dispatch(
        &self,
        args: &DelegateTaskArgs,
        parent: &ParentContext,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<TaskReport> {
        let args = args.validate()?;

        let target = match &args.target {
            TaskTarget::Continue(session_id) => {
                return self
                    .run_continuation(&args, session_id, parent, cancel, started)
                    .await;
            }
            target => target,
        };

        let availability = self.availability.snapshot().await;
        let selection = select_model(
            &self.catalog,
            &self.config,
            target,
            parent.ui_selected_model.as_deref(),
            &availability,
        )?;

        let task = NewTask {
            description: args.description.clone(),
            prompt: args.prompt.clone(),
            selection,
        };

        if args.run_in_background {
            self.run_background(&task, parent, cancel, started).await
        } else if task.selection.unstable {
            self.run_supervised(&task, parent, cancel, started).await
        } else {
            self.run_sync(&task, parent, cancel, started).await
        }
    }
}

fn launch_error(error: DelegateError) -> DelegateError {
    match error {
        DelegateError::Launch(_) => error,
        other => DelegateError::Launch(other.to_string()),
    }
}
