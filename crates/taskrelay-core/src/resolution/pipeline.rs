//! Priority-ordered model resolution.

use taskrelay_traits::{
    AvailabilitySnapshot, FallbackEntry, ModelAvailability, Provenance, ResolutionRequest,
    ResolutionResult,
};
use tracing::debug;

use super::matcher::fuzzy_match_model;

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn provider_of(model: &str) -> Option<&str> {
    model
        .split_once('/')
        .map(|(provider, _)| provider)
        .filter(|provider| !provider.is_empty())
}

/// Resolve which model a task should run on.
///
/// Steps short-circuit in order: UI selection, user override, category
/// default, fallback chain, system default. `None` means no step produced a
/// model and the host's own default applies.
pub fn resolve(request: &ResolutionRequest) -> Option<ResolutionResult> {
    let ResolutionRequest {
        intent,
        constraints,
        policy,
    } = request;
    let mut attempted = Vec::new();

    if let Some(model) = non_blank(intent.ui_selected_model.as_deref()) {
        debug!(model, "Resolved from UI selection");
        return Some(result(model, Provenance::Override, None, attempted));
    }

    if let Some(model) = non_blank(intent.user_model.as_deref()) {
        debug!(model, "Resolved from user configuration");
        return Some(result(model, Provenance::Override, None, attempted));
    }

    if let Some(default_model) = non_blank(intent.category_default_model.as_deref()) {
        attempted.push(default_model.to_string());
        if let Some(model) = resolve_category_default(default_model, constraints) {
            debug!(model = %model, "Resolved from category default");
            return Some(result(&model, Provenance::CategoryDefault, None, attempted));
        }
    }

    for entry in &policy.fallback_chain {
        if let Some(model) = resolve_fallback_entry(entry, constraints, &mut attempted) {
            debug!(model = %model, "Resolved from fallback chain");
            return Some(result(
                &model,
                Provenance::ProviderFallback,
                entry.variant.clone(),
                attempted,
            ));
        }
    }

    if let Some(model) = non_blank(policy.system_default_model.as_deref()) {
        debug!(model, ?attempted, "Resolved to system default");
        return Some(result(model, Provenance::SystemDefault, None, attempted));
    }

    debug!(?attempted, "No model resolved");
    None
}

fn result(
    model: &str,
    provenance: Provenance,
    variant: Option<String>,
    attempted: Vec<String>,
) -> ResolutionResult {
    ResolutionResult {
        model: model.to_string(),
        provenance,
        variant,
        attempted,
    }
}

fn resolve_category_default(
    default_model: &str,
    constraints: &AvailabilitySnapshot,
) -> Option<String> {
    let provider = provider_of(default_model);
    match &constraints.models {
        ModelAvailability::Known(available) => {
            let hint = provider.map(|p| vec![p.to_string()]);
            fuzzy_match_model(default_model, available, hint.as_deref())
        }
        ModelAvailability::Unknown => {
            // Cold cache: trust the default unless the provider cache says
            // its provider is not connected.
            let accept = match (&constraints.connected_providers, provider) {
                (None, _) => true,
                (Some(_), Some(provider)) => constraints.is_provider_connected(provider),
                (Some(_), None) => false,
            };
            accept.then(|| default_model.to_string())
        }
    }
}

fn resolve_fallback_entry(
    entry: &FallbackEntry,
    constraints: &AvailabilitySnapshot,
    attempted: &mut Vec<String>,
) -> Option<String> {
    match &constraints.models {
        ModelAvailability::Known(available) => {
            for provider in &entry.providers {
                let candidate = format!("{}/{}", provider, entry.model);
                let matched =
                    fuzzy_match_model(&candidate, available, Some(std::slice::from_ref(provider)));
                attempted.push(candidate);
                if matched.is_some() {
                    return matched;
                }
            }
            fuzzy_match_model(&entry.model, available, None)
        }
        ModelAvailability::Unknown => {
            let connected = constraints.connected_providers.as_ref()?;
            entry
                .providers
                .iter()
                .find(|provider| connected.contains(provider))
                .map(|provider| {
                    let candidate = format!("{}/{}", provider, entry.model);
                    attempted.push(candidate.clone());
                    candidate
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskrelay_traits::{ResolutionIntent, ResolutionPolicy};

    fn request(intent: ResolutionIntent, constraints: AvailabilitySnapshot) -> ResolutionRequest {
        ResolutionRequest {
            intent,
            constraints,
            policy: ResolutionPolicy::default(),
        }
    }

    fn with_chain(
        mut request: ResolutionRequest,
        chain: Vec<FallbackEntry>,
        system_default: Option<&str>,
    ) -> ResolutionRequest {
        request.policy = ResolutionPolicy {
            fallback_chain: chain,
            system_default_model: system_default.map(str::to_string),
        };
        request
    }

    #[test]
    fn test_ui_selection_always_wins() {
        let req = with_chain(
            request(
                ResolutionIntent {
                    ui_selected_model: Some("  openai/gpt-5.2  ".to_string()),
                    user_model: Some("anthropic/claude-sonnet-4-5".to_string()),
                    category_default_model: Some("google/gemini-3-pro".to_string()),
                },
                AvailabilitySnapshot::with_models(Vec::<String>::new()),
            ),
            vec![FallbackEntry::new(["anthropic"], "claude-opus")],
            Some("anthropic/claude-haiku-4-5"),
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "openai/gpt-5.2");
        assert_eq!(resolved.provenance, Provenance::Override);
    }

    #[test]
    fn test_blank_ui_selection_is_ignored() {
        let req = request(
            ResolutionIntent {
                ui_selected_model: Some("   ".to_string()),
                user_model: Some("anthropic/claude-sonnet-4-5".to_string()),
                ..Default::default()
            },
            AvailabilitySnapshot::unknown(),
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "anthropic/claude-sonnet-4-5");
        assert_eq!(resolved.provenance, Provenance::Override);
    }

    #[test]
    fn test_category_default_matched_against_availability() {
        let req = request(
            ResolutionIntent {
                category_default_model: Some("anthropic/claude-opus-4-5".to_string()),
                ..Default::default()
            },
            AvailabilitySnapshot::with_models(["anthropic/claude-opus-4.5", "openai/gpt-5.2"]),
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "anthropic/claude-opus-4.5");
        assert_eq!(resolved.provenance, Provenance::CategoryDefault);
    }

    #[test]
    fn test_category_default_optimistic_on_cold_cache() {
        let req = request(
            ResolutionIntent {
                category_default_model: Some("google/gemini-3-pro".to_string()),
                ..Default::default()
            },
            AvailabilitySnapshot::unknown(),
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "google/gemini-3-pro");
        assert_eq!(resolved.provenance, Provenance::CategoryDefault);
    }

    #[test]
    fn test_category_default_skipped_when_provider_disconnected() {
        let req = with_chain(
            request(
                ResolutionIntent {
                    category_default_model: Some("google/gemini-3-pro".to_string()),
                    ..Default::default()
                },
                AvailabilitySnapshot::unknown().with_connected_providers(["anthropic"]),
            ),
            vec![FallbackEntry::new(["google", "anthropic"], "claude-opus-4-6")],
            None,
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "anthropic/claude-opus-4-6");
        assert_eq!(resolved.provenance, Provenance::ProviderFallback);
    }

    #[test]
    fn test_known_empty_is_strict() {
        let req = with_chain(
            request(
                ResolutionIntent {
                    category_default_model: Some("google/gemini-3-pro".to_string()),
                    ..Default::default()
                },
                AvailabilitySnapshot::with_models(Vec::<String>::new()),
            ),
            vec![FallbackEntry::new(["google"], "gemini-3-pro")],
            None,
        );

        assert!(resolve(&req).is_none());
    }

    #[test]
    fn test_first_listed_provider_wins() {
        let req = with_chain(
            request(
                ResolutionIntent::default(),
                AvailabilitySnapshot::with_models([
                    "anthropic/claude-opus-4-6",
                    "github-copilot/claude-opus-4-6-preview",
                ]),
            ),
            vec![FallbackEntry::new(["anthropic", "github-copilot"], "claude-opus")],
            None,
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "anthropic/claude-opus-4-6");
        assert_eq!(resolved.provenance, Provenance::ProviderFallback);
    }

    #[test]
    fn test_cross_provider_match_keeps_variant() {
        let req = with_chain(
            request(
                ResolutionIntent::default(),
                AvailabilitySnapshot::with_models(["opencode/glm-4.7"]),
            ),
            vec![FallbackEntry::new(["zai"], "glm-4.7").with_variant("high")],
            None,
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "opencode/glm-4.7");
        assert_eq!(resolved.variant.as_deref(), Some("high"));
        assert_eq!(resolved.attempted, vec!["zai/glm-4.7".to_string()]);
    }

    #[test]
    fn test_cold_cache_uses_connected_providers() {
        let req = with_chain(
            request(
                ResolutionIntent::default(),
                AvailabilitySnapshot::unknown().with_connected_providers(["openai"]),
            ),
            vec![
                FallbackEntry::new(["anthropic"], "claude-opus-4-6"),
                FallbackEntry::new(["github-copilot", "openai"], "gpt-5.2").with_variant("high"),
            ],
            None,
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "openai/gpt-5.2");
        assert_eq!(resolved.variant.as_deref(), Some("high"));
    }

    #[test]
    fn test_system_default_when_chain_exhausted() {
        let req = with_chain(
            request(
                ResolutionIntent::default(),
                AvailabilitySnapshot::with_models(["openai/gpt-5.2"]),
            ),
            vec![
                FallbackEntry::new(["anthropic"], "claude-opus"),
                FallbackEntry::new(["google"], "gemini-3-pro"),
            ],
            Some("anthropic/claude-sonnet-4-5"),
        );

        let resolved = resolve(&req).unwrap();
        assert_eq!(resolved.model, "anthropic/claude-sonnet-4-5");
        assert_eq!(resolved.provenance, Provenance::SystemDefault);
        assert_eq!(
            resolved.attempted,
            vec![
                "anthropic/claude-opus".to_string(),
                "google/gemini-3-pro".to_string()
            ]
        );
    }

    #[test]
    fn test_no_opinion_without_system_default() {
        let req = request(ResolutionIntent::default(), AvailabilitySnapshot::unknown());
        assert!(resolve(&req).is_none());
    }
}
