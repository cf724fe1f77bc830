//! Collaborator interfaces the dispatcher is written against.
//!
//! Concrete implementations live in taskrelay-core (HTTP backend, local
//! background manager, cached availability) or in the embedding host.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{AvailabilitySnapshot, ModelCandidate};
use crate::session::{SessionMessage, SessionState};
use crate::task::DelegatedTask;

/// Per-tool allow/deny map sent along with a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolPermissions(BTreeMap<String, bool>);

impl ToolPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&mut self, tool: impl Into<String>) -> &mut Self {
        self.0.insert(tool.into(), true);
        self
    }

    pub fn deny(&mut self, tool: impl Into<String>) -> &mut Self {
        self.0.insert(tool.into(), false);
        self
    }

    /// Tools without an entry are allowed.
    pub fn is_allowed(&self, tool: &str) -> bool {
        self.0.get(tool).copied().unwrap_or(true)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(tool, allowed)| (tool.as_str(), *allowed))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One prompt delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub session_id: String,
    pub agent: String,
    /// Model and variant; `None` lets the host pick its default
    pub model: Option<ModelCandidate>,
    pub tools: ToolPermissions,
    pub text: String,
}

/// Session/messaging backend.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Open a child session and return its id.
    async fn create_session(
        &self,
        parent_id: &str,
        title: &str,
        directory: &str,
    ) -> Result<String>;

    /// Deliver a prompt. Returns once the backend accepted it.
    async fn send_prompt(&self, request: &PromptRequest) -> Result<()>;

    /// Full message history of a session.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<SessionMessage>>;

    /// Activity state of every session the backend knows about.
    async fn session_status(&self) -> Result<HashMap<String, SessionState>>;
}

/// Input for launching a new background task.
#[derive(Debug, Clone)]
pub struct LaunchInput {
    pub description: String,
    pub prompt: String,
    pub agent: String,
    pub parent_session_id: String,
    pub parent_directory: String,
    pub model: Option<ModelCandidate>,
    pub tools: ToolPermissions,
    pub category: Option<String>,
}

/// Input for prompting an existing session in the background.
#[derive(Debug, Clone)]
pub struct ResumeInput {
    pub session_id: String,
    pub prompt: String,
    pub description: String,
    pub agent: String,
    pub parent_session_id: String,
    pub model: Option<ModelCandidate>,
    pub tools: ToolPermissions,
}

/// Fire-and-forget task runner.
#[async_trait]
pub trait BackgroundManager: Send + Sync {
    /// Start a task. The returned task may not have a session id yet.
    async fn launch(&self, input: LaunchInput) -> Result<DelegatedTask>;

    /// Continue an existing session in the background.
    async fn resume(&self, input: ResumeInput) -> Result<DelegatedTask>;

    /// Current state of a task, if it is still tracked.
    fn get_task(&self, task_id: &str) -> Option<DelegatedTask>;

    /// Stop a task. Returns whether anything was cancelled.
    fn cancel(&self, _task_id: &str) -> bool {
        false
    }
}

/// Source of model/provider availability.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn snapshot(&self) -> AvailabilitySnapshot;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_permissions_default_allow() {
        let mut tools = ToolPermissions::new();
        tools.deny("task").allow("read");

        assert!(!tools.is_allowed("task"));
        assert!(tools.is_allowed("read"));
        assert!(tools.is_allowed("bash"));
    }

    #[test]
    fn test_tool_permissions_serialize_as_map() {
        let mut tools = ToolPermissions::new();
        tools.deny("question");
        let json = serde_json::to_value(&tools).unwrap();
        assert_eq!(json, serde_json::json!({"question": false}));
    }
}
