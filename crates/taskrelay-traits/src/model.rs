//! Model identity, availability and resolution types.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A concrete `provider/model` pair with an optional variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// Provider id (e.g. "anthropic")
    pub provider: String,
    /// Model id within the provider (e.g. "claude-opus-4-6")
    pub model: String,
    /// Optional variant (e.g. "max", "high")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl ModelCandidate {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            variant: None,
        }
    }

    pub fn with_variant(mut self, variant: Option<String>) -> Self {
        self.variant = variant;
        self
    }

    /// Parse a `provider/model[...]` string.
    ///
    /// Only the first `/` separates provider from model, so model ids that
    /// themselves contain slashes (`openrouter/meta/llama`) survive intact.
    /// Returns `None` when either side is empty.
    pub fn parse(value: &str) -> Option<Self> {
        let (provider, model) = value.trim().split_once('/')?;
        let provider = provider.trim();
        let model = model.trim();
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }

    /// `provider/model` without the variant.
    pub fn full_id(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

impl fmt::Display for ModelCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)?;
        if let Some(variant) = &self.variant {
            write!(f, " ({variant})")?;
        }
        Ok(())
    }
}

/// "Try this model on any of these providers, in order."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackEntry {
    pub providers: Vec<String>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl FallbackEntry {
    pub fn new<I, S>(providers: I, model: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            providers: providers.into_iter().map(Into::into).collect(),
            model: model.into(),
            variant: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

/// Which `provider/model` strings are currently usable.
///
/// `Unknown` means nothing has been checked yet (cold cache). `Known` with an
/// empty set means the check ran and found nothing; the two are resolved very
/// differently, so they are never collapsed into one empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModelAvailability {
    #[default]
    Unknown,
    Known(BTreeSet<String>),
}

impl ModelAvailability {
    pub fn known<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Known(models.into_iter().map(Into::into).collect())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// The known set, if availability has been checked.
    pub fn models(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Unknown => None,
            Self::Known(models) => Some(models),
        }
    }
}

/// Availability constraints handed to the resolution pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilitySnapshot {
    pub models: ModelAvailability,
    /// Connected provider ids; `None` when no provider cache exists at all.
    pub connected_providers: Option<Vec<String>>,
}

impl AvailabilitySnapshot {
    /// Nothing cached at all.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_models<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: ModelAvailability::known(models),
            connected_providers: None,
        }
    }

    pub fn with_connected_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connected_providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_provider_connected(&self, provider: &str) -> bool {
        self.connected_providers
            .as_ref()
            .is_some_and(|providers| providers.iter().any(|p| p == provider))
    }
}

/// Which resolution step produced the chosen model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Override,
    CategoryDefault,
    ProviderFallback,
    SystemDefault,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::CategoryDefault => "category-default",
            Self::ProviderFallback => "provider-fallback",
            Self::SystemDefault => "system-default",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionIntent {
    /// Model explicitly selected in the UI for this request.
    pub ui_selected_model: Option<String>,
    /// Model set by the user's configuration for this category/agent.
    pub user_model: Option<String>,
    /// Built-in default model for the category.
    pub category_default_model: Option<String>,
}

/// Fallback policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPolicy {
    pub fallback_chain: Vec<FallbackEntry>,
    pub system_default_model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub intent: ResolutionIntent,
    pub constraints: AvailabilitySnapshot,
    pub policy: ResolutionPolicy,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub model: String,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Candidates tried before this one, for diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempted: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_candidate() {
        let candidate = ModelCandidate::parse(" anthropic/claude-opus-4-6 ").unwrap();
        assert_eq!(candidate.provider, "anthropic");
        assert_eq!(candidate.model, "claude-opus-4-6");
        assert_eq!(candidate.full_id(), "anthropic/claude-opus-4-6");
    }

    #[test]
    fn test_parse_keeps_nested_model_path() {
        let candidate = ModelCandidate::parse("openrouter/meta/llama-4").unwrap();
        assert_eq!(candidate.provider, "openrouter");
        assert_eq!(candidate.model, "meta/llama-4");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ModelCandidate::parse("claude-opus").is_none());
        assert!(ModelCandidate::parse("/claude-opus").is_none());
        assert!(ModelCandidate::parse("anthropic/").is_none());
        assert!(ModelCandidate::parse("   ").is_none());
    }

    #[test]
    fn test_display_includes_variant() {
        let candidate = ModelCandidate::new("openai", "gpt-5.2").with_variant(Some("high".into()));
        assert_eq!(candidate.to_string(), "openai/gpt-5.2 (high)");
    }

    #[test]
    fn test_unknown_is_not_known_empty() {
        let unknown = ModelAvailability::Unknown;
        let empty = ModelAvailability::known(Vec::<String>::new());
        assert!(unknown.is_unknown());
        assert!(!empty.is_unknown());
        assert_ne!(unknown, empty);
        assert!(empty.models().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn test_provenance_serialization() {
        let json = serde_json::to_string(&Provenance::ProviderFallback).unwrap();
        assert_eq!(json, "\"provider-fallback\"");
        assert_eq!(Provenance::CategoryDefault.to_string(), "category-default");
    }

    #[test]
    fn test_connected_provider_lookup() {
        let snapshot = AvailabilitySnapshot::unknown().with_connected_providers(["anthropic"]);
        assert!(snapshot.is_provider_connected("anthropic"));
        assert!(!snapshot.is_provider_connected("openai"));
        assert!(!AvailabilitySnapshot::unknown().is_provider_connected("anthropic"));
    }
}
