//! Continuing an existing session.
//!
//! Agent and model are inherited from the session history instead of being
//! resolved again.

use taskrelay_traits::{
    DelegatedTask, DispatchMode, DispatchPlan, ModelCandidate, PromptRequest, Result, ResumeInput,
    SessionMessage, TaskMetadata, TaskOutcome, TaskReport, TaskStatus,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::report::render_continued_in_background;
use super::sync::aborted_report;
use super::{
    ParentContext, TaskDispatcher, ValidatedArgs, elapsed_ms, launch_error, new_task_id,
    tool_permissions,
};

/// Identity last used in a session.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct InheritedIdentity {
    pub agent: Option<String>,
    pub model: Option<ModelCandidate>,
}

/// Latest agent and latest model recorded in the history, found independently
/// so a later message without a model does not hide an earlier one.
pub(super) fn inherit_identity(messages: &[SessionMessage]) -> InheritedIdentity {
    InheritedIdentity {
        agent: messages.iter().rev().find_map(|message| message.agent.clone()),
        model: messages.iter().rev().find_map(|message| message.model.clone()),
    }
}

impl TaskDispatcher {
    pub(super) async fn run_continuation(
        &self,
        args: &ValidatedArgs,
        session_id: &str,
        parent: &ParentContext,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<TaskReport> {
        let history = self.backend.list_messages(session_id).await?;
        let anchor = history.len();
        let inherited = inherit_identity(&history);
        debug!(
            session_id,
            anchor,
            agent = inherited.agent.as_deref(),
            model = inherited.model.as_ref().map(ModelCandidate::full_id),
            "Continuing session"
        );

        let agent_name = inherited
            .agent
            .unwrap_or_else(|| self.config.category_agent.clone());
        let agent = self.catalog.find_agent(&agent_name);
        let tools = tool_permissions(agent);
        let model = inherited.model;

        let mode = if args.run_in_background {
            DispatchMode::BackgroundContinuation
        } else {
            DispatchMode::SyncContinuation
        };
        self.hooks.before_dispatch(&DispatchPlan {
            mode,
            description: args.description.clone(),
            agent: agent_name.clone(),
            category: None,
            model: model.clone(),
            provenance: None,
            session_id: Some(session_id.to_string()),
        });

        let mut metadata = TaskMetadata {
            title: args.description.clone(),
            session_id: Some(session_id.to_string()),
            agent: agent_name.clone(),
            model: model.as_ref().map(ModelCandidate::full_id),
            run_in_background: args.run_in_background,
            ..Default::default()
        };

        if cancel.is_cancelled() {
            return Ok(aborted_report(metadata, started));
        }

        if args.run_in_background {
            let task = self
                .background
                .resume(ResumeInput {
                    session_id: session_id.to_string(),
                    prompt: args.prompt.clone(),
                    description: args.description.clone(),
                    agent: agent_name,
                    parent_session_id: parent.session_id.clone(),
                    model,
                    tools,
                })
                .await
                .map_err(launch_error)?;
            info!(task_id = %task.id, session_id, "Background continuation started");

            metadata.task_id = Some(task.id.clone());
            metadata.duration_ms = Some(elapsed_ms(started));
            return Ok(TaskReport {
                output: render_continued_in_background(&task, &metadata),
                metadata,
                outcome: TaskOutcome::Launched,
            });
        }

        let mut tracked = DelegatedTask::new(new_task_id(), &args.description, &agent_name);
        tracked.session_id = Some(session_id.to_string());
        tracked.parent_session_id = Some(parent.session_id.clone());
        tracked.model = model.clone();

        let registration = self.registry.register(tracked);
        registration.set_status(TaskStatus::Running);
        metadata.task_id = Some(registration.id().to_string());

        let request = PromptRequest {
            session_id: session_id.to_string(),
            agent: agent_name,
            model,
            tools,
            text: args.prompt.clone(),
        };

        self.prompt_and_wait(&registration, request, Some(anchor), metadata, cancel, started)
            .await
    }
}
