//! In-process background task runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use taskrelay_traits::{
    BackgroundManager, DelegateError, DelegatedTask, LaunchInput, ModelCandidate, NoopHooks,
    PromptRequest, Result, ResumeInput, SessionBackend, TaskStatus, ToolPermissions,
};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::session::{
    CompletionPoller, PollOutcome, create_child_session, fetch_result, send_prompt_with_retry,
};

/// Finished tasks older than this are dropped when the next task is spawned.
const FINISHED_RETENTION_MS: i64 = 300_000;

/// Work for one spawned task.
struct Job {
    description: String,
    agent: String,
    prompt: String,
    parent_session_id: String,
    directory: String,
    /// Existing session to continue; a child session is created otherwise
    session_id: Option<String>,
    model: Option<ModelCandidate>,
    tools: ToolPermissions,
}

struct Inner {
    backend: Arc<dyn SessionBackend>,
    polling: PollingConfig,
    tasks: DashMap<String, DelegatedTask>,
    abort_handles: DashMap<String, AbortHandle>,
    results: DashMap<String, String>,
}

/// Runs delegated tasks on tokio tasks against a `SessionBackend`.
///
/// `launch` returns immediately with a pending task; the session id shows up
/// on the tracked task once the child session exists.
#[derive(Clone)]
pub struct LocalBackgroundManager {
    inner: Arc<Inner>,
}

impl LocalBackgroundManager {
    pub fn new(backend: Arc<dyn SessionBackend>, polling: PollingConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                polling,
                tasks: DashMap::new(),
                abort_handles: DashMap::new(),
                results: DashMap::new(),
            }),
        }
    }

    pub fn list(&self) -> Vec<DelegatedTask> {
        self.inner
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Final text of a completed task.
    pub fn result(&self, task_id: &str) -> Option<String> {
        self.inner.results.get(task_id).map(|entry| entry.clone())
    }

    /// Poll until the task ends or stops being tracked.
    pub async fn wait(&self, task_id: &str, interval: Duration) -> Option<DelegatedTask> {
        loop {
            let task = self.inner.tasks.get(task_id).map(|entry| entry.clone())?;
            if task.status.is_terminal() {
                return Some(task);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Drop finished tasks, and their results, that ended at least
    /// `max_age_ms` ago. Returns how many were dropped.
    pub fn cleanup_finished(&self, max_age_ms: i64) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let expired: Vec<String> = self
            .inner
            .tasks
            .iter()
            .filter(|entry| {
                entry
                    .completed_at
                    .is_some_and(|completed_at| now - completed_at >= max_age_ms)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in &expired {
            self.inner.tasks.remove(id);
            self.inner.results.remove(id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Dropped finished background tasks");
        }
        expired.len()
    }

    fn spawn(&self, mut task: DelegatedTask, job: Job) -> DelegatedTask {
        self.cleanup_finished(FINISHED_RETENTION_MS);

        task.id = format!("bg_{}", uuid::Uuid::new_v4().simple());
        task.parent_session_id = Some(job.parent_session_id.clone());
        task.session_id = job.session_id.clone();
        task.model = job.model.clone();
        let id = task.id.clone();
        self.inner.tasks.insert(id.clone(), task.clone());

        let inner = Arc::clone(&self.inner);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let outcome = inner.execute(&task_id, job).await;
            inner.finish(&task_id, outcome);
        });

        self.inner
            .abort_handles
            .insert(id.clone(), handle.abort_handle());
        if self
            .inner
            .tasks
            .get(&id)
            .is_none_or(|task| task.status.is_terminal())
        {
            self.inner.abort_handles.remove(&id);
        }
        task
    }
}

impl Inner {
    fn update(&self, task_id: &str, apply: impl FnOnce(&mut DelegatedTask)) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            apply(&mut task);
        }
    }

    async fn execute(&self, task_id: &str, job: Job) -> Result<String> {
        let (session_id, anchor) = match &job.session_id {
            Some(session_id) => {
                let history = self.backend.list_messages(session_id).await?;
                (session_id.clone(), Some(history.len()))
            }
            None => {
                let session_id = create_child_session(
                    self.backend.as_ref(),
                    &job.parent_session_id,
                    &job.directory,
                    &job.description,
                    &job.agent,
                )
                .await?;
                self.update(task_id, |task| task.session_id = Some(session_id.clone()));
                (session_id, None)
            }
        };
        self.update(task_id, |task| {
            task.advance(TaskStatus::Running);
        });

        let request = PromptRequest {
            session_id: session_id.clone(),
            agent: job.agent,
            model: job.model,
            tools: job.tools,
            text: job.prompt,
        };
        if let Some(model) = send_prompt_with_retry(self.backend.as_ref(), &request).await? {
            self.update(task_id, |task| task.model = Some(model));
        }

        let poller = CompletionPoller::new(
            self.backend.as_ref(),
            &NoopHooks,
            self.polling.poll_interval(),
            self.polling.sync_timeout(),
        );
        // Cancellation goes through the abort handle.
        let cancel = CancellationToken::new();
        match poller.wait_for_completion(&session_id, anchor, &cancel).await {
            PollOutcome::Complete { .. } => {
                fetch_result(self.backend.as_ref(), &session_id, anchor).await
            }
            PollOutcome::TimedOut | PollOutcome::Aborted => Err(DelegateError::NoResponse {
                session_id,
                reason: "Background task timed out before the session completed".to_string(),
            }),
        }
    }

    fn finish(&self, task_id: &str, outcome: Result<String>) {
        self.abort_handles.remove(task_id);
        match outcome {
            Ok(text) => {
                let mut completed = false;
                self.update(task_id, |task| completed = task.advance(TaskStatus::Completed));
                if completed {
                    self.results.insert(task_id.to_string(), text);
                    info!(task_id, "Background task completed");
                }
            }
            Err(e) => {
                warn!(task_id, error = %e, "Background task failed");
                self.update(task_id, |task| {
                    if task.advance(TaskStatus::Error) {
                        task.error = Some(e.to_string());
                    }
                });
            }
        }
    }
}

#[async_trait]
impl BackgroundManager for LocalBackgroundManager {
    async fn launch(&self, input: LaunchInput) -> Result<DelegatedTask> {
        let mut task = DelegatedTask::new("", &input.description, &input.agent);
        task.category = input.category.clone();
        let task = self.spawn(
            task,
            Job {
                description: input.description,
                agent: input.agent,
                prompt: input.prompt,
                parent_session_id: input.parent_session_id,
                directory: input.parent_directory,
                session_id: None,
                model: input.model,
                tools: input.tools,
            },
        );
        info!(task_id = %task.id, agent = %task.agent, "Background task launched");
        Ok(task)
    }

    async fn resume(&self, input: ResumeInput) -> Result<DelegatedTask> {
        let task = DelegatedTask::new("", &input.description, &input.agent);
        let task = self.spawn(
            task,
            Job {
                description: input.description,
                agent: input.agent,
                prompt: input.prompt,
                parent_session_id: input.parent_session_id,
                directory: String::new(),
                session_id: Some(input.session_id),
                model: input.model,
                tools: input.tools,
            },
        );
        info!(task_id = %task.id, session_id = task.session_id.as_deref(), "Background task resumed");
        Ok(task)
    }

    fn get_task(&self, task_id: &str) -> Option<DelegatedTask> {
        self.inner.tasks.get(task_id).map(|entry| entry.clone())
    }

    fn cancel(&self, task_id: &str) -> bool {
        if let Some((_, handle)) = self.inner.abort_handles.remove(task_id) {
            handle.abort();
        }
        self.inner.results.remove(task_id);
        let removed = self.inner.tasks.remove(task_id).is_some();
        if removed {
            info!(task_id, "Background task cancelled");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testkit::ScriptedBackend;
    use taskrelay_traits::{MessageRole, SessionMessage};

    fn fast_polling() -> PollingConfig {
        PollingConfig {
            poll_interval_ms: 5,
            sync_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    fn launch_input() -> LaunchInput {
        LaunchInput {
            description: "Find usages".to_string(),
            prompt: "Find every caller of parse()".to_string(),
            agent: "explore".to_string(),
            parent_session_id: "ses_parent".to_string(),
            parent_directory: "/work".to_string(),
            model: Some(ModelCandidate::new("anthropic", "claude-haiku-4-5")),
            tools: ToolPermissions::new(),
            category: None,
        }
    }

    async fn wait_for_status(
        manager: &LocalBackgroundManager,
        task_id: &str,
        status: TaskStatus,
    ) -> DelegatedTask {
        for _ in 0..400 {
            if let Some(task) = manager.get_task(task_id)
                && task.status == status
            {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} never reached {status:?}");
    }

    #[tokio::test]
    async fn test_launch_runs_to_completion() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.reply_with("parse() is called from main.rs");
        let manager = LocalBackgroundManager::new(backend.clone(), fast_polling());

        let launched = manager.launch(launch_input()).await.unwrap();
        assert_eq!(launched.status, TaskStatus::Pending);
        assert!(launched.id.starts_with("bg_"));

        let task = manager
            .wait(&launched.id, Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.session_id.as_deref(), Some("ses_001"));
        assert!(task.completed_at.is_some());
        assert_eq!(
            manager.result(&launched.id).as_deref(),
            Some("parse() is called from main.rs")
        );

        let created = backend.created_sessions();
        assert_eq!(created[0].parent_id, "ses_parent");
        assert_eq!(created[0].title, "Find usages (@explore subagent)");
    }

    #[tokio::test]
    async fn test_prompt_failure_marks_error() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_next_prompt("provider offline");
        let manager = LocalBackgroundManager::new(backend, fast_polling());

        let launched = manager.launch(launch_input()).await.unwrap();
        let task = wait_for_status(&manager, &launched.id, TaskStatus::Error).await;
        assert!(task.error.unwrap().contains("provider offline"));
        assert!(manager.result(&launched.id).is_none());
    }

    #[tokio::test]
    async fn test_resume_reads_only_new_output() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_messages(
            "ses_old",
            crate::testkit::conversation(&[
                (MessageRole::User, "first"),
                (MessageRole::Assistant, "first answer"),
            ]),
        );
        backend.reply_with("second answer");
        let manager = LocalBackgroundManager::new(backend.clone(), fast_polling());

        let task = manager
            .resume(ResumeInput {
                session_id: "ses_old".to_string(),
                prompt: "again".to_string(),
                description: "Follow up".to_string(),
                agent: "explore".to_string(),
                parent_session_id: "ses_parent".to_string(),
                model: None,
                tools: ToolPermissions::new(),
            })
            .await
            .unwrap();
        assert_eq!(task.session_id.as_deref(), Some("ses_old"));

        wait_for_status(&manager, &task.id, TaskStatus::Completed).await;
        assert_eq!(manager.result(&task.id).as_deref(), Some("second answer"));
        assert!(backend.created_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_drops_only_finished_tasks() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.reply_with("done");
        let manager = LocalBackgroundManager::new(backend.clone(), fast_polling());

        let finished = manager.launch(launch_input()).await.unwrap();
        manager
            .wait(&finished.id, Duration::from_millis(5))
            .await
            .unwrap();
        // No reply queued, so this one keeps polling.
        let running = manager.launch(launch_input()).await.unwrap();

        assert_eq!(manager.cleanup_finished(FINISHED_RETENTION_MS), 0);
        assert_eq!(manager.cleanup_finished(0), 1);
        assert!(manager.get_task(&finished.id).is_none());
        assert!(manager.result(&finished.id).is_none());
        assert!(manager.get_task(&running.id).is_some());

        manager.cancel(&running.id);
    }

    #[tokio::test]
    async fn test_cancel_removes_task() {
        let backend = Arc::new(ScriptedBackend::new());
        let manager = LocalBackgroundManager::new(backend.clone(), fast_polling());

        let launched = manager.launch(launch_input()).await.unwrap();
        assert!(manager.cancel(&launched.id));
        assert!(manager.get_task(&launched.id).is_none());
        assert!(manager.list().is_empty());
        assert!(!manager.cancel(&launched.id));

        // The aborted job never writes the task back.
        backend.set_messages(
            "ses_001",
            vec![SessionMessage::assistant("msg_9999", "late").with_finish("stop")],
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(manager.get_task(&launched.id).is_none());
    }
}
