//! Error types for delegated task dispatch.

use thiserror::Error;

/// Dispatch error taxonomy.
///
/// Abort and timeout are absent: they are expected terminal
/// outcomes and travel as [`crate::TaskOutcome`] on a successful report.
#[derive(Error, Debug)]
pub enum DelegateError {
    /// Caller supplied arguments that cannot be dispatched.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Unknown category/agent or a required model that is not available.
    #[error("{0}")]
    Resolution(String),

    /// Transport failure talking to the session backend.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The prompt could not be delivered to an already created session.
    #[error("Failed to send prompt: {message}\n\nSession ID: {session_id}")]
    Prompt { session_id: String, message: String },

    /// The session finished but no usable response could be extracted.
    #[error("{reason}\n\nSession ID: {session_id}")]
    NoResponse { session_id: String, reason: String },

    /// The background manager refused or failed to launch the task.
    #[error("Failed to launch background task: {0}")]
    Launch(String),

    /// A background task the caller was waiting on ended in error.
    #[error("Background task {task_id} failed: {message}")]
    BackgroundTask {
        task_id: String,
        session_id: Option<String>,
        message: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DelegateError {
    /// Session the error refers to, when one had already been created.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Prompt { session_id, .. } | Self::NoResponse { session_id, .. } => {
                Some(session_id)
            }
            Self::BackgroundTask { session_id, .. } => session_id.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DelegateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_response_mentions_session() {
        let err = DelegateError::NoResponse {
            session_id: "ses_1".to_string(),
            reason: "No assistant response found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("No assistant response found"));
        assert!(text.contains("ses_1"));
        assert_eq!(err.session_id(), Some("ses_1"));
    }

    #[test]
    fn test_background_task_keeps_message_and_session() {
        let err = DelegateError::BackgroundTask {
            task_id: "bg_1".to_string(),
            session_id: Some("ses_1".to_string()),
            message: "Failed to send prompt: quota exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Background task bg_1 failed: Failed to send prompt: quota exceeded"
        );
        assert_eq!(err.session_id(), Some("ses_1"));
    }

    #[test]
    fn test_resolution_message_is_verbatim() {
        let err = DelegateError::Resolution("Unknown category 'nope'".to_string());
        assert_eq!(err.to_string(), "Unknown category 'nope'");
        assert!(err.session_id().is_none());
    }
}
