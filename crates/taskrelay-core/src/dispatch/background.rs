//! Background dispatch: launch and return once a session id is known.

use taskrelay_traits::{
    DelegatedTask, DispatchMode, LaunchInput, Result, TaskOutcome, TaskReport,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::report::render_launched;
use super::sync::aborted_report;
use super::{NewTask, ParentContext, TaskDispatcher, elapsed_ms, launch_error, tool_permissions};

impl TaskDispatcher {
    pub(super) async fn run_background(
        &self,
        task: &NewTask,
        parent: &ParentContext,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<TaskReport> {
        self.hooks.before_dispatch(&task.plan(DispatchMode::Background));

        let mut metadata = task.metadata(true);
        if cancel.is_cancelled() {
            return Ok(aborted_report(metadata, started));
        }

        let launched = self.launch(task, parent).await?;
        let launched = self.wait_for_session(launched, cancel).await;

        metadata.task_id = Some(launched.id.clone());
        metadata.session_id = launched.session_id.clone();
        metadata.duration_ms = Some(elapsed_ms(started));

        Ok(TaskReport {
            output: render_launched(&launched, &metadata),
            metadata,
            outcome: TaskOutcome::Launched,
        })
    }

    pub(super) async fn launch(&self, task: &NewTask, parent: &ParentContext) -> Result<DelegatedTask> {
        let agent = &task.selection.agent;
        let input = LaunchInput {
            description: task.description.clone(),
            prompt: task.prompt.clone(),
            agent: agent.name.clone(),
            parent_session_id: parent.session_id.clone(),
            parent_directory: parent.directory.clone(),
            model: task.selection.model.clone(),
            tools: tool_permissions(Some(agent)),
            category: task
                .selection
                .category
                .as_ref()
                .map(|category| category.name.clone()),
        };

        let launched = self.background.launch(input).await.map_err(launch_error)?;
        info!(task_id = %launched.id, agent = %agent.name, "Background task launched");
        Ok(launched)
    }

    /// Poll the background manager until the task reports a session id, ends,
    /// disappears, or the wait budget runs out.
    pub(super) async fn wait_for_session(
        &self,
        task: DelegatedTask,
        cancel: &CancellationToken,
    ) -> DelegatedTask {
        if task.session_id.is_some() {
            return task;
        }

        let polling = &self.config.polling;
        let start = Instant::now();
        let mut latest = task;

        while start.elapsed() < polling.session_wait_timeout() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(polling.session_wait_interval()) => {}
            }

            let Some(current) = self.background.get_task(&latest.id) else {
                debug!(task_id = %latest.id, "Task no longer tracked while waiting for session");
                break;
            };
            let settled = current.session_id.is_some() || current.status.is_terminal();
            latest = current;
            if settled {
                break;
            }
        }

        match &latest.session_id {
            Some(session_id) => {
                debug!(task_id = %latest.id, session_id = %session_id, "Background session assigned");
            }
            None => warn!(
                task_id = %latest.id,
                waited_ms = elapsed_ms(start),
                "Background task has no session yet"
            ),
        }
        latest
    }
}
