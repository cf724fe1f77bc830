//! In-memory collaborators for tests.
//!
//! `ScriptedBackend` replays scripted statuses and histories and records every
//! call; `ScriptedBackgroundManager` and `RecordingHooks` do the same for the
//! background manager and dispatch hooks.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use taskrelay_traits::{
    BackgroundManager, DelegateError, DelegatedTask, DispatchHooks, DispatchPlan, LaunchInput,
    MessageRole, PollTick, PromptRequest, Result, ResumeInput, SessionBackend, SessionMessage,
    SessionState, TaskMetadata, TaskOutcome, TaskStatus,
};

/// A `create_session` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    pub parent_id: String,
    pub title: String,
    pub directory: String,
}

#[derive(Default)]
struct BackendState {
    next_session: usize,
    next_message: usize,
    created: Vec<CreatedSession>,
    prompts: Vec<PromptRequest>,
    messages: HashMap<String, Vec<SessionMessage>>,
    snapshots: HashMap<String, VecDeque<Vec<SessionMessage>>>,
    statuses: HashMap<String, VecDeque<SessionState>>,
    replies: VecDeque<String>,
    create_failures: VecDeque<String>,
    prompt_failures: VecDeque<String>,
    status_failures: VecDeque<String>,
    message_failures: VecDeque<String>,
}

impl BackendState {
    fn next_message_id(&mut self) -> String {
        self.next_message += 1;
        format!("msg_{:04}", self.next_message)
    }
}

/// Scripted `SessionBackend`.
///
/// Each accepted prompt appends a user message to the session; if a reply
/// was queued with [`ScriptedBackend::reply_with`] an assistant message with
/// finish reason `stop` follows it.
#[derive(Default)]
pub struct ScriptedBackend {
    state: Mutex<BackendState>,
    status_calls: AtomicUsize,
    message_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace a session's history. Later generated ids sort after it.
    pub fn set_messages(&self, session_id: &str, messages: Vec<SessionMessage>) {
        let mut state = self.state();
        let highest = messages
            .iter()
            .filter_map(|message| {
                let id = message.id.as_deref()?;
                id.rsplit('_').next()?.parse::<usize>().ok()
            })
            .max()
            .unwrap_or(0);
        state.next_message = state.next_message.max(highest);
        state.messages.insert(session_id.to_string(), messages);
    }

    /// Queue a history for the next `list_messages` call on a session, ahead
    /// of the live history. Models a host that rewrites history between calls.
    pub fn push_history(&self, session_id: &str, messages: Vec<SessionMessage>) {
        self.state()
            .snapshots
            .entry(session_id.to_string())
            .or_default()
            .push_back(messages);
    }

    /// Queue a status; once the queue drains the session is absent (idle).
    pub fn push_status(&self, session_id: &str, state: SessionState) {
        self.state()
            .statuses
            .entry(session_id.to_string())
            .or_default()
            .push_back(state);
    }

    /// Queue an assistant reply for the next accepted prompt.
    pub fn reply_with(&self, text: impl Into<String>) {
        self.state().replies.push_back(text.into());
    }

    pub fn fail_next_create(&self, message: impl Into<String>) {
        self.state().create_failures.push_back(message.into());
    }

    pub fn fail_next_prompt(&self, message: impl Into<String>) {
        self.state().prompt_failures.push_back(message.into());
    }

    pub fn fail_next_status(&self, message: impl Into<String>) {
        self.state().status_failures.push_back(message.into());
    }

    pub fn fail_next_messages(&self, message: impl Into<String>) {
        self.state().message_failures.push_back(message.into());
    }

    pub fn created_sessions(&self) -> Vec<CreatedSession> {
        self.state().created.clone()
    }

    /// Every prompt attempt, including failed ones.
    pub fn prompts(&self) -> Vec<PromptRequest> {
        self.state().prompts.clone()
    }

    pub fn messages(&self, session_id: &str) -> Vec<SessionMessage> {
        self.state()
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn message_calls(&self) -> usize {
        self.message_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBackend for ScriptedBackend {
    async fn create_session(
        &self,
        parent_id: &str,
        title: &str,
        directory: &str,
    ) -> Result<String> {
        let mut state = self.state();
        if let Some(message) = state.create_failures.pop_front() {
            return Err(DelegateError::Backend(message));
        }
        state.next_session += 1;
        let session_id = format!("ses_{:03}", state.next_session);
        state.created.push(CreatedSession {
            session_id: session_id.clone(),
            parent_id: parent_id.to_string(),
            title: title.to_string(),
            directory: directory.to_string(),
        });
        state.messages.entry(session_id.clone()).or_default();
        Ok(session_id)
    }

    async fn send_prompt(&self, request: &PromptRequest) -> Result<()> {
        let mut state = self.state();
        state.prompts.push(request.clone());
        if let Some(message) = state.prompt_failures.pop_front() {
            return Err(DelegateError::Backend(message));
        }

        let user_id = state.next_message_id();
        let mut user = SessionMessage::user(user_id, request.text.clone())
            .with_agent(request.agent.clone())
            .with_created_at(state.next_message as i64);
        user.model = request.model.clone();
        let reply = state.replies.pop_front().map(|text| {
            let id = state.next_message_id();
            let mut message = SessionMessage::assistant(id, text)
                .with_finish("stop")
                .with_agent(request.agent.clone())
                .with_created_at(state.next_message as i64);
            message.model = request.model.clone();
            message
        });

        let history = state
            .messages
            .entry(request.session_id.clone())
            .or_default();
        history.push(user);
        history.extend(reply);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<SessionMessage>> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if let Some(message) = state.message_failures.pop_front() {
            return Err(DelegateError::Backend(message));
        }
        if let Some(snapshot) = state
            .snapshots
            .get_mut(session_id)
            .and_then(VecDeque::pop_front)
        {
            return Ok(snapshot);
        }
        Ok(state.messages.get(session_id).cloned().unwrap_or_default())
    }

    async fn session_status(&self) -> Result<HashMap<String, SessionState>> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if let Some(message) = state.status_failures.pop_front() {
            return Err(DelegateError::Backend(message));
        }
        Ok(state
            .statuses
            .iter_mut()
            .filter_map(|(id, queue)| queue.pop_front().map(|status| (id.clone(), status)))
            .collect())
    }
}

#[derive(Default)]
struct ManagerState {
    next_task: usize,
    launches: Vec<LaunchInput>,
    resumes: Vec<ResumeInput>,
    tasks: HashMap<String, DelegatedTask>,
    /// Session id a launched task reports once enough lookups have happened
    pending_sessions: HashMap<String, (usize, String)>,
    cancelled: Vec<String>,
}

/// Scripted `BackgroundManager`.
///
/// Launched tasks start without a session id; it appears after a configured
/// number of `get_task` lookups, or never.
#[derive(Default)]
pub struct ScriptedBackgroundManager {
    state: Mutex<ManagerState>,
    session_after_lookups: Mutex<Option<(usize, String)>>,
    launch_failure: Mutex<Option<String>>,
}

impl ScriptedBackgroundManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next launch reports `session_id` after `lookups` calls to `get_task`.
    pub fn assign_session_after(&self, lookups: usize, session_id: impl Into<String>) {
        *self
            .session_after_lookups
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some((lookups, session_id.into()));
    }

    pub fn fail_launch(&self, message: impl Into<String>) {
        *self.launch_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    pub fn launches(&self) -> Vec<LaunchInput> {
        self.state().launches.clone()
    }

    pub fn resumes(&self) -> Vec<ResumeInput> {
        self.state().resumes.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }
}

#[async_trait]
impl BackgroundManager for ScriptedBackgroundManager {
    async fn launch(&self, input: LaunchInput) -> Result<DelegatedTask> {
        if let Some(message) = self
            .launch_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            return Err(DelegateError::Launch(message));
        }
        let assignment = self
            .session_after_lookups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let mut state = self.state();
        state.next_task += 1;
        let id = format!("bg_{:03}", state.next_task);
        let mut task = DelegatedTask::new(&id, &input.description, &input.agent);
        task.parent_session_id = Some(input.parent_session_id.clone());
        task.model = input.model.clone();
        task.category = input.category.clone();
        task.advance(TaskStatus::Running);

        if let Some((0, session_id)) = &assignment {
            task.session_id = Some(session_id.clone());
        } else if let Some(assignment) = assignment {
            state.pending_sessions.insert(id.clone(), assignment);
        }

        state.launches.push(input);
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn resume(&self, input: ResumeInput) -> Result<DelegatedTask> {
        let mut state = self.state();
        state.next_task += 1;
        let id = format!("bg_{:03}", state.next_task);
        let mut task = DelegatedTask::new(&id, &input.description, &input.agent);
        task.session_id = Some(input.session_id.clone());
        task.parent_session_id = Some(input.parent_session_id.clone());
        task.model = input.model.clone();
        task.advance(TaskStatus::Running);

        state.resumes.push(input);
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    fn get_task(&self, task_id: &str) -> Option<DelegatedTask> {
        let mut state = self.state();
        let ready = match state.pending_sessions.get_mut(task_id) {
            Some((remaining, session_id)) => {
                *remaining = remaining.saturating_sub(1);
                (*remaining == 0).then(|| session_id.clone())
            }
            None => None,
        };
        if let Some(session_id) = ready {
            state.pending_sessions.remove(task_id);
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.session_id = Some(session_id);
            }
        }
        state.tasks.get(task_id).cloned()
    }

    fn cancel(&self, task_id: &str) -> bool {
        let mut state = self.state();
        state.cancelled.push(task_id.to_string());
        state.tasks.remove(task_id).is_some()
    }
}

/// A hook invocation.
#[derive(Debug, Clone)]
pub enum HookEvent {
    BeforeDispatch(DispatchPlan),
    AfterDispatch(TaskMetadata, TaskOutcome),
    PollTick(PollTick),
    TaskReleased(DelegatedTask),
}

/// Hooks that record every call.
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: HookEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<HookEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn released(&self) -> Vec<DelegatedTask> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HookEvent::TaskReleased(task) => Some(task),
                _ => None,
            })
            .collect()
    }

    pub fn outcomes(&self) -> Vec<TaskOutcome> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HookEvent::AfterDispatch(_, outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    pub fn poll_ticks(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, HookEvent::PollTick(_)))
            .count()
    }
}

impl DispatchHooks for RecordingHooks {
    fn before_dispatch(&self, plan: &DispatchPlan) {
        self.record(HookEvent::BeforeDispatch(plan.clone()));
    }

    fn after_dispatch(&self, metadata: &TaskMetadata, outcome: TaskOutcome) {
        self.record(HookEvent::AfterDispatch(metadata.clone(), outcome));
    }

    fn on_poll_tick(&self, tick: &PollTick) {
        self.record(HookEvent::PollTick(tick.clone()));
    }

    fn on_task_released(&self, task: &DelegatedTask) {
        self.record(HookEvent::TaskReleased(task.clone()));
    }
}

/// Convenience for building message histories in tests.
pub fn conversation(turns: &[(MessageRole, &str)]) -> Vec<SessionMessage> {
    turns
        .iter()
        .enumerate()
        .map(|(index, (role, text))| {
            let id = format!("msg_{:04}", index + 1);
            let message = match role {
                MessageRole::User => SessionMessage::user(id, *text),
                MessageRole::Assistant => SessionMessage::assistant(id, *text).with_finish("stop"),
            };
            message.with_created_at(index as i64 + 1)
        })
        .collect()
}
