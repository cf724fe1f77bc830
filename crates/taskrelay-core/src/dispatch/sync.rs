//! Synchronous dispatch: create, prompt, poll, fetch.

use taskrelay_traits::{
    DelegatedTask, DispatchMode, PromptRequest, Result, TaskMetadata, TaskOutcome, TaskReport,
    TaskStatus,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::report::{render_aborted, render_completed, render_timed_out};
use super::{NewTask, ParentContext, TaskDispatcher, elapsed_ms, new_task_id, tool_permissions};
use crate::registry::TaskRegistration;
use crate::session::{PollOutcome, create_child_session, fetch_result, send_prompt_with_retry};

impl TaskDispatcher {
    pub(super) async fn run_sync(
        &self,
        task: &NewTask,
        parent: &ParentContext,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<TaskReport> {
        self.hooks.before_dispatch(&task.plan(DispatchMode::Sync));
        let agent = &task.selection.agent;

        let mut metadata = task.metadata(false);
        let mut tracked = DelegatedTask::new(new_task_id(), &task.description, &agent.name);
        tracked.parent_session_id = Some(parent.session_id.clone());
        tracked.model = task.selection.model.clone();
        tracked.category = metadata.category.clone();

        let registration = self.registry.register(tracked);
        metadata.task_id = Some(registration.id().to_string());
        if cancel.is_cancelled() {
            registration.fail("aborted");
            return Ok(aborted_report(metadata, started));
        }

        let session_id = match create_child_session(
            self.backend.as_ref(),
            &parent.session_id,
            &parent.directory,
            &task.description,
            &agent.name,
        )
        .await
        {
            Ok(session_id) => session_id,
            Err(e) => {
                registration.fail(e.to_string());
                return Err(e);
            }
        };
        registration.set_session(&session_id);
        registration.set_status(TaskStatus::Running);
        metadata.session_id = Some(session_id.clone());

        let request = PromptRequest {
            session_id,
            agent: agent.name.clone(),
            model: task.selection.model.clone(),
            tools: tool_permissions(Some(agent)),
            text: task.prompt.clone(),
        };

        self.prompt_and_wait(&registration, request, None, metadata, cancel, started)
            .await
    }

    /// Send the prompt, poll to completion and fetch the reply. Shared by new
    /// synchronous tasks and synchronous continuations.
    pub(super) async fn prompt_and_wait(
        &self,
        registration: &TaskRegistration,
        request: PromptRequest,
        anchor: Option<usize>,
        mut metadata: TaskMetadata,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<TaskReport> {
        let session_id = request.session_id.clone();

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = send_prompt_with_retry(self.backend.as_ref(), &request) => Some(result),
        };
        match sent {
            None => {
                registration.fail("aborted");
                return Ok(aborted_report(metadata, started));
            }
            Some(Err(e)) => {
                registration.fail(e.to_string());
                return Err(e);
            }
            Some(Ok(Some(model))) => metadata.model = Some(model.full_id()),
            Some(Ok(None)) => {}
        }

        let budget = self.config.polling.sync_timeout();
        match self
            .poller(budget)
            .wait_for_completion(&session_id, anchor, cancel)
            .await
        {
            PollOutcome::Aborted => {
                registration.fail("aborted");
                Ok(aborted_report(metadata, started))
            }
            PollOutcome::TimedOut => {
                registration.fail("timed out");
                Ok(timed_out_report(metadata, started, budget))
            }
            PollOutcome::Complete { .. } => {
                let text = match fetch_result(self.backend.as_ref(), &session_id, anchor).await {
                    Ok(text) => text,
                    Err(e) => {
                        registration.fail(e.to_string());
                        return Err(e);
                    }
                };
                registration.set_status(TaskStatus::Completed);
                info!(session_id = %session_id, task_id = registration.id(), "Task completed");
                Ok(completed_report(metadata, started, &text))
            }
        }
    }
}

pub(super) fn completed_report(
    mut metadata: TaskMetadata,
    started: Instant,
    text: &str,
) -> TaskReport {
    metadata.duration_ms = Some(elapsed_ms(started));
    TaskReport {
        output: render_completed(&metadata, started.elapsed(), text),
        metadata,
        outcome: TaskOutcome::Completed,
    }
}

pub(super) fn aborted_report(mut metadata: TaskMetadata, started: Instant) -> TaskReport {
    metadata.duration_ms = Some(elapsed_ms(started));
    TaskReport {
        output: render_aborted(&metadata, started.elapsed()),
        metadata,
        outcome: TaskOutcome::Aborted,
    }
}

pub(super) fn timed_out_report(
    mut metadata: TaskMetadata,
    started: Instant,
    budget: std::time::Duration,
) -> TaskReport {
    metadata.duration_ms = Some(elapsed_ms(started));
    TaskReport {
        output: render_timed_out(&metadata, budget),
        metadata,
        outcome: TaskOutcome::TimedOut,
    }
}
