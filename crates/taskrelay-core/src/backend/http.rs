use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use taskrelay_traits::{
    DelegateError, PromptRequest, Result, SessionBackend, SessionMessage, SessionState,
};
use tracing::debug;

use super::wire::{CreateSessionBody, CreatedSession, PromptBody, WireMessage, WireStatus};

/// Error bodies are cut to this many bytes.
const MAX_ERROR_BODY: usize = 512;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `SessionBackend` over a session server's HTTP API.
pub struct HttpSessionBackend {
    client: Client,
    base_url: String,
}

impl HttpSessionBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_url(&self, session_id: &str, suffix: &str) -> String {
        self.url(&format!(
            "/session/{}{}",
            urlencoding::encode(session_id),
            suffix
        ))
    }
}

fn transport(error: reqwest::Error) -> DelegateError {
    DelegateError::Backend(error.to_string())
}

fn truncate_body(body: &str) -> &str {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Pass a success response through; turn anything else into a `Backend` error.
async fn check(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DelegateError::Backend(format!(
        "{action} failed with status {status}: {}",
        truncate_body(body.trim())
    )))
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn create_session(
        &self,
        parent_id: &str,
        title: &str,
        directory: &str,
    ) -> Result<String> {
        let url = format!(
            "{}?directory={}",
            self.url("/session"),
            urlencoding::encode(directory)
        );
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&CreateSessionBody { parent_id, title })
            .send()
            .await
            .map_err(transport)?;

        let created: CreatedSession = check(response, "Create session")
            .await?
            .json()
            .await
            .map_err(transport)?;
        debug!(session_id = %created.id, parent_id, "Session created");
        Ok(created.id)
    }

    async fn send_prompt(&self, request: &PromptRequest) -> Result<()> {
        let response = self
            .client
            .post(self.session_url(&request.session_id, "/prompt_async"))
            .timeout(REQUEST_TIMEOUT)
            .json(&PromptBody::from(request))
            .send()
            .await
            .map_err(transport)?;
        check(response, "Send prompt").await?;
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<SessionMessage>> {
        let response = self
            .client
            .get(self.session_url(session_id, "/message"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        let messages: Vec<WireMessage> = check(response, "List messages")
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(messages
            .into_iter()
            .filter_map(WireMessage::into_message)
            .collect())
    }

    async fn session_status(&self) -> Result<HashMap<String, SessionState>> {
        let response = self
            .client
            .get(self.url("/session/status"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        let statuses: HashMap<String, WireStatus> = check(response, "Session status")
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(statuses
            .into_iter()
            .map(|(id, status)| (id, status.state()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskrelay_traits::{MessageRole, ModelCandidate, ToolPermissions};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(query_param("directory", "/work/my repo"))
            .and(body_json(json!({
                "parentID": "ses_parent",
                "title": "Find usages (@explore subagent)"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ses_child"})))
            .mount(&server)
            .await;

        let backend = HttpSessionBackend::new(format!("{}/", server.uri()));
        let id = backend
            .create_session("ses_parent", "Find usages (@explore subagent)", "/work/my repo")
            .await
            .unwrap();
        assert_eq!(id, "ses_child");
    }

    #[tokio::test]
    async fn test_send_prompt_error_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/ses_1/prompt_async"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string("Model not found: claude-opus. Did you mean claude-opus-4-6?"),
            )
            .mount(&server)
            .await;

        let backend = HttpSessionBackend::new(server.uri());
        let request = PromptRequest {
            session_id: "ses_1".to_string(),
            agent: "general".to_string(),
            model: Some(ModelCandidate::new("anthropic", "claude-opus")),
            tools: ToolPermissions::new(),
            text: "hello".to_string(),
        };
        let err = backend.send_prompt(&request).await.unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, DelegateError::Backend(_)));
        assert!(text.contains("400"));
        assert!(text.contains("Did you mean claude-opus-4-6?"));
    }

    #[tokio::test]
    async fn test_list_messages_normalizes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/session/ses_1/message"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"info": {"id": "msg_1", "role": "user", "agent": "explore"},
                 "parts": [{"type": "text", "text": "find it"}]},
                {"info": {"id": "msg_2", "role": "assistant", "finish": "stop",
                          "providerID": "anthropic", "modelID": "claude-haiku-4-5"},
                 "parts": [{"type": "text", "text": "found"}]}
            ])))
            .mount(&server)
            .await;

        let backend = HttpSessionBackend::new(server.uri());
        let messages = backend.list_messages("ses_1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].agent.as_deref(), Some("explore"));
        assert_eq!(messages[1].text_content(), "found");
        assert_eq!(
            messages[1].model.as_ref().map(ModelCandidate::full_id).as_deref(),
            Some("anthropic/claude-haiku-4-5")
        );
    }

    #[tokio::test]
    async fn test_session_status_map() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/session/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ses_1": {"type": "busy"},
                "ses_2": {"type": "idle"},
                "ses_3": {"type": "retry", "attempt": 2}
            })))
            .mount(&server)
            .await;

        let backend = HttpSessionBackend::new(server.uri());
        let statuses = backend.session_status().await.unwrap();
        assert_eq!(statuses.get("ses_1"), Some(&SessionState::Busy));
        assert_eq!(statuses.get("ses_2"), Some(&SessionState::Idle));
        assert_eq!(statuses.get("ses_3"), Some(&SessionState::Busy));
    }

    #[test]
    fn test_error_body_truncated_on_char_boundary() {
        let body = "é".repeat(400);
        let cut = truncate_body(&body);
        assert!(cut.len() <= MAX_ERROR_BODY);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_connection_error_is_backend_error() {
        let backend = HttpSessionBackend::new("http://127.0.0.1:59999");
        let err = backend.session_status().await.unwrap_err();
        assert!(matches!(err, DelegateError::Backend(_)));
    }
}
