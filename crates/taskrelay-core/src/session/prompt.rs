//! Prompt delivery with a single "did you mean" model retry.

use std::sync::LazyLock;

use regex::Regex;
use taskrelay_traits::{DelegateError, ModelCandidate, PromptRequest, Result, SessionBackend};
use tracing::{info, warn};

static SUGGESTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)did you mean[:\s]*["'`]?([A-Za-z0-9][\w.\-/:]*)"#).expect("Invalid regex")
});

/// Extract the first suggested model from a "model not found" error.
pub fn parse_model_suggestion(error: &str) -> Option<String> {
    if !error.to_lowercase().contains("model not found") {
        return None;
    }
    let captures = SUGGESTION_PATTERN.captures(error)?;
    let suggestion = captures.get(1)?.as_str().trim_end_matches(['.', ':']);
    (!suggestion.is_empty()).then(|| suggestion.to_string())
}

/// Apply a suggestion to the model that failed. A bare model id keeps the
/// original provider; the variant always carries over.
fn apply_suggestion(
    original: Option<&ModelCandidate>,
    suggestion: &str,
) -> Option<ModelCandidate> {
    let variant = original.and_then(|model| model.variant.clone());
    if suggestion.contains('/') {
        return ModelCandidate::parse(suggestion).map(|model| model.with_variant(variant));
    }
    original.map(|model| ModelCandidate::new(&model.provider, suggestion).with_variant(variant))
}

/// Send a prompt, retrying once with the backend's suggested model when the
/// requested one does not exist. Returns the model that was accepted.
pub async fn send_prompt_with_retry(
    backend: &dyn SessionBackend,
    request: &PromptRequest,
) -> Result<Option<ModelCandidate>> {
    let first = match backend.send_prompt(request).await {
        Ok(()) => return Ok(request.model.clone()),
        Err(e) => e,
    };

    let message = first.to_string();
    let retry_model = parse_model_suggestion(&message)
        .and_then(|suggestion| apply_suggestion(request.model.as_ref(), &suggestion))
        .filter(|model| Some(model) != request.model.as_ref());

    let Some(retry_model) = retry_model else {
        return Err(prompt_error(&request.session_id, first));
    };

    info!(
        session_id = %request.session_id,
        requested = ?request.model.as_ref().map(ModelCandidate::full_id),
        suggested = %retry_model.full_id(),
        "Model not found, retrying with suggestion"
    );

    let retry = PromptRequest {
        model: Some(retry_model.clone()),
        ..request.clone()
    };
    match backend.send_prompt(&retry).await {
        Ok(()) => Ok(Some(retry_model)),
        Err(e) => {
            warn!(session_id = %request.session_id, error = %e, "Retry with suggested model failed");
            Err(prompt_error(&request.session_id, e))
        }
    }
}

fn prompt_error(session_id: &str, error: DelegateError) -> DelegateError {
    match error {
        DelegateError::Prompt { .. } => error,
        other => DelegateError::Prompt {
            session_id: session_id.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedBackend;
    use taskrelay_traits::ToolPermissions;

    fn request(model: Option<ModelCandidate>) -> PromptRequest {
        PromptRequest {
            session_id: "ses_1".to_string(),
            agent: "explore".to_string(),
            model,
            tools: ToolPermissions::new(),
            text: "find it".to_string(),
        }
    }

    #[test]
    fn test_parse_suggestion() {
        assert_eq!(
            parse_model_suggestion(
                "Model not found: anthropic/claude-opus-4-7. Did you mean: claude-opus-4-6, claude-opus-4-5?"
            )
            .as_deref(),
            Some("claude-opus-4-6")
        );
        assert_eq!(
            parse_model_suggestion(
                "ProviderModelNotFoundError: model not found, did you mean \"openai/gpt-5.2\"?"
            )
            .as_deref(),
            Some("openai/gpt-5.2")
        );
        assert!(parse_model_suggestion("rate limited, did you mean to wait?").is_none());
        assert!(parse_model_suggestion("Model not found").is_none());
    }

    #[tokio::test]
    async fn test_retry_keeps_provider_and_variant() {
        let backend = ScriptedBackend::new();
        backend.fail_next_prompt(
            "Model not found: anthropic/claude-opus-4-7. Did you mean: claude-opus-4-6?",
        );

        let model =
            ModelCandidate::new("anthropic", "claude-opus-4-7").with_variant(Some("max".into()));
        let accepted = send_prompt_with_retry(&backend, &request(Some(model)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(accepted.full_id(), "anthropic/claude-opus-4-6");
        assert_eq!(accepted.variant.as_deref(), Some("max"));

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(
            prompts[1].model.as_ref().map(ModelCandidate::full_id).as_deref(),
            Some("anthropic/claude-opus-4-6")
        );
    }

    #[tokio::test]
    async fn test_retries_only_once() {
        let backend = ScriptedBackend::new();
        backend.fail_next_prompt("Model not found. Did you mean: gpt-5.2?");
        backend.fail_next_prompt("Model not found. Did you mean: gpt-5.1?");

        let model = ModelCandidate::new("openai", "gpt-5");
        let err = send_prompt_with_retry(&backend, &request(Some(model)))
            .await
            .unwrap_err();

        assert!(matches!(err, DelegateError::Prompt { .. }));
        assert!(err.to_string().contains("gpt-5.1"));
        assert_eq!(backend.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let backend = ScriptedBackend::new();
        backend.fail_next_prompt("connection reset");

        let err = send_prompt_with_retry(&backend, &request(None)).await.unwrap_err();
        assert_eq!(err.session_id(), Some("ses_1"));
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(backend.prompts().len(), 1);
    }
}
