use taskrelay_traits::{DelegateError, Result, SessionBackend, SessionMessage};
use tracing::debug;

pub const NO_NEW_RESPONSE: &str = "Session completed but no new response was generated";
pub const NO_ASSISTANT_RESPONSE: &str = "No assistant response found";

/// Text of the latest assistant reply, optionally only among messages after
/// the first `anchor` ones.
///
/// "Latest" is by creation time since servers do not guarantee ordering; ties
/// go to the later position.
pub fn extract_result(
    messages: &[SessionMessage],
    anchor: Option<usize>,
) -> std::result::Result<String, &'static str> {
    let window = match anchor {
        Some(anchor) => match messages.get(anchor..) {
            Some(window) if !window.is_empty() => window,
            _ => return Err(NO_NEW_RESPONSE),
        },
        None => messages,
    };

    window
        .iter()
        .filter(|message| message.is_assistant())
        .max_by_key(|message| message.created_at.unwrap_or(i64::MIN))
        .map(SessionMessage::text_content)
        .ok_or(NO_ASSISTANT_RESPONSE)
}

/// Fetch history and extract the result; failures carry the session id.
pub async fn fetch_result(
    backend: &dyn SessionBackend,
    session_id: &str,
    anchor: Option<usize>,
) -> Result<String> {
    let messages = backend.list_messages(session_id).await?;
    debug!(session_id, count = messages.len(), ?anchor, "Fetched session history");

    extract_result(&messages, anchor).map_err(|reason| DelegateError::NoResponse {
        session_id: session_id.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedBackend;
    use taskrelay_traits::{MessagePart, MessageRole};

    #[test]
    fn test_latest_by_creation_time() {
        let messages = vec![
            SessionMessage::user("msg_001", "q").with_created_at(1),
            SessionMessage::assistant("msg_003", "newer").with_created_at(30),
            SessionMessage::assistant("msg_002", "older").with_created_at(20),
        ];
        assert_eq!(extract_result(&messages, None).unwrap(), "newer");
    }

    #[test]
    fn test_text_and_reasoning_joined() {
        let message = SessionMessage::new(MessageRole::Assistant)
            .with_part(MessagePart::Reasoning {
                text: "thinking".to_string(),
            })
            .with_part(MessagePart::Text {
                text: "answer".to_string(),
            });
        assert_eq!(extract_result(&[message], None).unwrap(), "thinking\nanswer");
    }

    #[test]
    fn test_anchor_past_end_is_no_new_response() {
        let messages = vec![SessionMessage::assistant("msg_002", "old")];
        let err = extract_result(&messages, Some(5)).unwrap_err();
        assert!(err.contains("no new response was generated"));
        let err = extract_result(&messages, Some(1)).unwrap_err();
        assert!(err.contains("no new response was generated"));
    }

    #[test]
    fn test_anchor_window_only() {
        let messages = vec![
            SessionMessage::user("msg_001", "first"),
            SessionMessage::assistant("msg_002", "old answer"),
            SessionMessage::user("msg_003", "second"),
            SessionMessage::assistant("msg_004", "new answer"),
        ];
        assert_eq!(extract_result(&messages, Some(2)).unwrap(), "new answer");
    }

    #[test]
    fn test_no_assistant() {
        let messages = vec![SessionMessage::user("msg_001", "q")];
        assert_eq!(
            extract_result(&messages, None).unwrap_err(),
            NO_ASSISTANT_RESPONSE
        );
    }

    #[tokio::test]
    async fn test_fetch_result_attaches_session() {
        let backend = ScriptedBackend::new();
        backend.set_messages("ses_1", vec![SessionMessage::user("msg_001", "q")]);

        let err = fetch_result(&backend, "ses_1", None).await.unwrap_err();
        assert_eq!(err.session_id(), Some("ses_1"));
        assert!(err.to_string().contains(NO_ASSISTANT_RESPONSE));
    }
}
