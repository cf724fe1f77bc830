//! Delegated task state and dispatch reports.

use serde::{Deserialize, Serialize};

use crate::model::{ModelCandidate, Provenance};

/// Delegated task status. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Error => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// pending → running → {completed | error}; terminal states never change.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// A unit of delegated work tracked by its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedTask {
    /// Unique task ID (never reused)
    pub id: String,

    /// Short task description
    pub description: String,

    /// Agent name (e.g., "explore", "general")
    pub agent: String,

    /// Child session; may be absent right after a background launch
    pub session_id: Option<String>,

    /// Session that delegated this task
    pub parent_session_id: Option<String>,

    /// Current status
    pub status: TaskStatus,

    /// Model the task runs on, if one was resolved
    pub model: Option<ModelCandidate>,

    /// Category the task was dispatched under
    pub category: Option<String>,

    /// Start timestamp (Unix ms)
    pub started_at: i64,

    /// Completion timestamp (Unix ms)
    pub completed_at: Option<i64>,

    /// Error message (if failed)
    pub error: Option<String>,
}

impl DelegatedTask {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            agent: agent.into(),
            session_id: None,
            parent_session_id: None,
            status: TaskStatus::Pending,
            model: None,
            category: None,
            started_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
            error: None,
        }
    }

    /// Apply a status change if it moves forward. Returns whether it applied.
    pub fn advance(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        }
        true
    }
}

/// How a dispatch call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Synchronous run produced a result
    Completed,
    /// Background run accepted; results are fetched later
    Launched,
    /// Caller cancelled
    Aborted,
    /// Poll budget exhausted
    TimedOut,
    /// Dispatch returned an error
    Failed,
}

/// Structured metadata accompanying every report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    pub run_in_background: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Uniform dispatch report: human-readable text plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub output: String,
    pub metadata: TaskMetadata,
    pub outcome: TaskOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_moves_forward_only() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Error));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Error));
        assert!(!TaskStatus::Error.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_advance_sets_completion_time() {
        let mut task = DelegatedTask::new("bg_1", "Find usages", "explore");
        assert!(task.advance(TaskStatus::Running));
        assert!(task.completed_at.is_none());
        assert!(task.advance(TaskStatus::Completed));
        assert!(task.completed_at.is_some());
        assert!(!task.advance(TaskStatus::Running));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_metadata_skips_empty_fields() {
        let metadata = TaskMetadata {
            title: "Find usages".to_string(),
            session_id: Some("ses_1".to_string()),
            agent: "explore".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["session_id"], "ses_1");
        assert!(json.get("task_id").is_none());
        assert!(json.get("provenance").is_none());
    }
}
