//! JSON shapes of the session server API.
//!
//! Everything is normalized into `taskrelay_traits` types here so the
//! dispatcher never sees raw payloads.

use serde::{Deserialize, Serialize};
use taskrelay_traits::{
    MessagePart, MessageRole, ModelCandidate, PromptRequest, SessionMessage, SessionState,
    ToolPermissions,
};

#[derive(Debug, Serialize)]
pub(super) struct CreateSessionBody<'a> {
    #[serde(rename = "parentID")]
    pub parent_id: &'a str,
    pub title: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreatedSession {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct ModelRef<'a> {
    #[serde(rename = "providerID")]
    provider_id: &'a str,
    #[serde(rename = "modelID")]
    model_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TextPartBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct PromptBody<'a> {
    agent: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<ModelRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<&'a str>,
    tools: &'a ToolPermissions,
    parts: Vec<TextPartBody<'a>>,
}

impl<'a> From<&'a PromptRequest> for PromptBody<'a> {
    fn from(request: &'a PromptRequest) -> Self {
        Self {
            agent: &request.agent,
            model: request.model.as_ref().map(|model| ModelRef {
                provider_id: &model.provider,
                model_id: &model.model,
            }),
            variant: request
                .model
                .as_ref()
                .and_then(|model| model.variant.as_deref()),
            tools: &request.tools,
            parts: vec![TextPartBody {
                kind: "text",
                text: &request.text,
            }],
        }
    }
}

/// A model as hosts report it: `"provider/model"` or an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireModel {
    Id(String),
    Pair {
        #[serde(rename = "providerID")]
        provider_id: String,
        #[serde(rename = "modelID")]
        model_id: String,
        #[serde(default)]
        variant: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct WireTime {
    #[serde(default)]
    created: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireInfo {
    #[serde(default)]
    id: Option<String>,
    role: String,
    #[serde(default)]
    time: Option<WireTime>,
    #[serde(default)]
    finish: Option<String>,
    #[serde(default)]
    agent: Option<String>,
    /// Older hosts record the agent as `mode`
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    model: Option<WireModel>,
    #[serde(default, rename = "providerID")]
    provider_id: Option<String>,
    #[serde(default, rename = "modelID")]
    model_id: Option<String>,
    #[serde(default)]
    variant: Option<String>,
}

impl WireInfo {
    fn model(&self) -> Option<ModelCandidate> {
        let (model, nested_variant) = match &self.model {
            Some(WireModel::Id(id)) => (ModelCandidate::parse(id), None),
            Some(WireModel::Pair {
                provider_id,
                model_id,
                variant,
            }) => (
                Some(ModelCandidate::new(provider_id, model_id)),
                variant.clone(),
            ),
            None => match (&self.provider_id, &self.model_id) {
                (Some(provider), Some(model)) => (Some(ModelCandidate::new(provider, model)), None),
                _ => (None, None),
            },
        };
        model
            .filter(|model| !model.provider.is_empty() && !model.model.is_empty())
            .map(|model| model.with_variant(nested_variant.or_else(|| self.variant.clone())))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum WirePart {
    Text {
        #[serde(default)]
        text: String,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    Tool {
        #[serde(default)]
        tool: String,
    },
    #[serde(other)]
    Other,
}

impl From<WirePart> for MessagePart {
    fn from(part: WirePart) -> Self {
        match part {
            WirePart::Text { text } => MessagePart::Text { text },
            WirePart::Reasoning { text } => MessagePart::Reasoning { text },
            WirePart::Tool { tool } => MessagePart::ToolCall { tool },
            WirePart::Other => MessagePart::Other,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireMessage {
    info: WireInfo,
    #[serde(default)]
    parts: Vec<WirePart>,
}

impl WireMessage {
    /// `None` for roles the dispatcher does not track.
    pub fn into_message(self) -> Option<SessionMessage> {
        let role = match self.info.role.as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            _ => return None,
        };
        let model = self.info.model();
        let WireInfo {
            id,
            time,
            finish,
            agent,
            mode,
            ..
        } = self.info;

        Some(SessionMessage {
            id,
            role,
            created_at: time.and_then(|time| time.created),
            finish_reason: finish,
            agent: agent.or(mode),
            model,
            parts: self.parts.into_iter().map(MessagePart::from).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireStatus {
    #[serde(rename = "type")]
    kind: String,
}

impl WireStatus {
    pub fn state(&self) -> SessionState {
        match self.kind.as_str() {
            "busy" | "retry" => SessionState::Busy,
            _ => SessionState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(value: serde_json::Value) -> SessionMessage {
        serde_json::from_value::<WireMessage>(value)
            .unwrap()
            .into_message()
            .unwrap()
    }

    #[test]
    fn test_model_as_string() {
        let parsed = message(json!({
            "info": {"id": "msg_1", "role": "assistant", "model": "openai/gpt-5.2", "variant": "high"},
            "parts": []
        }));
        let model = parsed.model.unwrap();
        assert_eq!(model.full_id(), "openai/gpt-5.2");
        assert_eq!(model.variant.as_deref(), Some("high"));
    }

    #[test]
    fn test_model_as_object_and_flat_fields() {
        let nested = message(json!({
            "info": {"role": "user", "model": {"providerID": "anthropic", "modelID": "claude-opus-4-6", "variant": "max"}}
        }));
        let model = nested.model.unwrap();
        assert_eq!(model.full_id(), "anthropic/claude-opus-4-6");
        assert_eq!(model.variant.as_deref(), Some("max"));

        let flat = message(json!({
            "info": {"role": "assistant", "providerID": "zai", "modelID": "glm-4.7", "mode": "explore"}
        }));
        assert_eq!(flat.model.unwrap().full_id(), "zai/glm-4.7");
        assert_eq!(flat.agent.as_deref(), Some("explore"));
    }

    #[test]
    fn test_parts_and_finish() {
        let parsed = message(json!({
            "info": {"id": "msg_2", "role": "assistant", "finish": "stop", "time": {"created": 1700000000000i64}},
            "parts": [
                {"type": "step-start"},
                {"type": "reasoning", "text": "thinking"},
                {"type": "tool", "tool": "grep"},
                {"type": "text", "text": "Done."}
            ]
        }));
        assert_eq!(parsed.finish_reason.as_deref(), Some("stop"));
        assert_eq!(parsed.created_at, Some(1_700_000_000_000));
        assert_eq!(
            parsed.parts,
            vec![
                MessagePart::Other,
                MessagePart::Reasoning {
                    text: "thinking".to_string()
                },
                MessagePart::ToolCall {
                    tool: "grep".to_string()
                },
                MessagePart::Text {
                    text: "Done.".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_system_messages_skipped() {
        let wire: WireMessage =
            serde_json::from_value(json!({"info": {"role": "system"}, "parts": []})).unwrap();
        assert!(wire.into_message().is_none());
    }

    #[test]
    fn test_prompt_body_shape() {
        let mut tools = ToolPermissions::new();
        tools.deny("task");
        let request = PromptRequest {
            session_id: "ses_1".to_string(),
            agent: "general".to_string(),
            model: Some(
                ModelCandidate::new("openai", "gpt-5.2-codex").with_variant(Some("xhigh".into())),
            ),
            tools,
            text: "Refactor the parser".to_string(),
        };

        let body = serde_json::to_value(PromptBody::from(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "agent": "general",
                "model": {"providerID": "openai", "modelID": "gpt-5.2-codex"},
                "variant": "xhigh",
                "tools": {"task": false},
                "parts": [{"type": "text", "text": "Refactor the parser"}]
            })
        );
    }

    #[test]
    fn test_retry_status_is_busy() {
        let status: WireStatus = serde_json::from_value(json!({"type": "retry"})).unwrap();
        assert_eq!(status.state(), SessionState::Busy);
        let status: WireStatus = serde_json::from_value(json!({"type": "idle"})).unwrap();
        assert_eq!(status.state(), SessionState::Idle);
    }
}
