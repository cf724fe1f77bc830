//! Synchronous calls on unstable models.
//!
//! These models may report idle mid-turn or never set a finish reason, so the
//! task is launched through the background manager and the caller waits until
//! the session output stops changing.

use std::time::Duration;

use taskrelay_traits::{
    DelegateError, DelegatedTask, DispatchMode, Result, TaskReport, TaskStatus,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::sync::{aborted_report, completed_report, timed_out_report};
use super::{NewTask, ParentContext, TaskDispatcher};
use crate::session::{PollOutcome, StabilityRule, fetch_result};

/// How a background task ended while the session was being watched.
#[derive(Debug, PartialEq, Eq)]
enum TaskExit {
    Failed(String),
    /// No longer tracked by the manager
    Gone,
}

fn exit_of(task: Option<DelegatedTask>) -> Option<TaskExit> {
    match task {
        None => Some(TaskExit::Gone),
        Some(task) if task.status == TaskStatus::Error => Some(TaskExit::Failed(
            task.error
                .unwrap_or_else(|| "task ended without an error message".to_string()),
        )),
        Some(_) => None,
    }
}

impl TaskDispatcher {
    pub(super) async fn run_supervised(
        &self,
        task: &NewTask,
        parent: &ParentContext,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<TaskReport> {
        self.hooks
            .before_dispatch(&task.plan(DispatchMode::SupervisedBackground));

        let mut metadata = task.metadata(false);
        if cancel.is_cancelled() {
            return Ok(aborted_report(metadata, started));
        }

        let launched = self.launch(task, parent).await?;
        let launched = self.wait_for_session(launched, cancel).await;
        let task_id = launched.id.clone();
        metadata.task_id = Some(task_id.clone());
        metadata.session_id = launched.session_id.clone();

        let Some(session_id) = launched.session_id.clone() else {
            if cancel.is_cancelled() {
                self.background.cancel(&task_id);
                return Ok(aborted_report(metadata, started));
            }
            return match exit_of(Some(launched)) {
                Some(TaskExit::Failed(message)) => Err(DelegateError::BackgroundTask {
                    task_id,
                    session_id: None,
                    message,
                }),
                _ => {
                    warn!(task_id = %task_id, "Supervised task never opened a session");
                    Ok(timed_out_report(
                        metadata,
                        started,
                        self.config.polling.session_wait_timeout(),
                    ))
                }
            };
        };

        let registration = self.registry.register(launched);
        registration.set_status(TaskStatus::Running);

        let polling = &self.config.polling;
        let rule = StabilityRule {
            min_elapsed: polling.min_stability_time(),
            polls_required: polling.stability_polls_required,
        };
        let budget = polling.sync_timeout();

        let poller = self.poller(budget);
        let mut outcome = tokio::select! {
            outcome = poller.wait_for_stability(&session_id, rule, cancel) => Ok(outcome),
            exit = self.watch_task(&task_id, polling.poll_interval()) => Err(exit),
        };
        // The session can settle before the manager records a failure.
        if matches!(outcome, Ok(PollOutcome::Complete { .. }))
            && let Some(TaskExit::Failed(message)) = exit_of(self.background.get_task(&task_id))
        {
            outcome = Err(TaskExit::Failed(message));
        }

        match outcome {
            Err(TaskExit::Failed(message)) => {
                registration.fail(message.clone());
                Err(DelegateError::BackgroundTask {
                    task_id,
                    session_id: Some(session_id),
                    message,
                })
            }
            Err(TaskExit::Gone) | Ok(PollOutcome::Aborted) => {
                registration.fail("aborted");
                if self.background.cancel(&task_id) {
                    info!(task_id = %task_id, "Cancelled supervised background task");
                }
                Ok(aborted_report(metadata, started))
            }
            Ok(PollOutcome::TimedOut) => {
                registration.fail("timed out");
                Ok(timed_out_report(metadata, started, budget))
            }
            Ok(PollOutcome::Complete { .. }) => {
                let text = match fetch_result(self.backend.as_ref(), &session_id, None).await {
                    Ok(text) => text,
                    Err(e) => {
                        registration.fail(e.to_string());
                        return Err(e);
                    }
                };
                registration.set_status(TaskStatus::Completed);
                Ok(completed_report(metadata, started, &text))
            }
        }
    }

    /// Resolves once the background task fails or stops being tracked.
    async fn watch_task(&self, task_id: &str, interval: Duration) -> TaskExit {
        loop {
            if let Some(exit) = exit_of(self.background.get_task(task_id)) {
                warn!(task_id, ?exit, "Supervised background task ended early");
                return exit;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_of_running_task_is_none() {
        let mut task = DelegatedTask::new("bg_1", "Landing page", "general");
        task.advance(TaskStatus::Running);
        assert_eq!(exit_of(Some(task)), None);
    }

    #[test]
    fn test_exit_of_failed_task_keeps_message() {
        let mut task = DelegatedTask::new("bg_1", "Landing page", "general");
        task.advance(TaskStatus::Error);
        task.error = Some("Failed to send prompt: quota exceeded".to_string());
        assert_eq!(
            exit_of(Some(task)),
            Some(TaskExit::Failed(
                "Failed to send prompt: quota exceeded".to_string()
            ))
        );
    }

    #[test]
    fn test_exit_of_missing_task_is_gone() {
        assert_eq!(exit_of(None), Some(TaskExit::Gone));
    }
}
