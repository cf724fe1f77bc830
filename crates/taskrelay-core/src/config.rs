//! Dispatch configuration file support
//!
//! Loads configuration from ~/.config/taskrelay/config.toml

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskrelay_traits::{DelegateError, FallbackEntry, Result};
use tracing::debug;

use crate::paths;

/// Top-level dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegateConfig {
    /// Last-resort model when nothing else resolves
    pub system_default_model: Option<String>,
    /// Agent that runs category-based tasks
    pub category_agent: String,
    /// Name fragments of model families that misbehave under tight sync polling
    pub unstable_model_families: Vec<String>,
    /// Poll timing
    pub polling: PollingConfig,
    /// User category overrides and additions
    pub categories: BTreeMap<String, CategoryConfig>,
    /// User agent overrides and additions
    pub agents: Vec<AgentConfig>,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            system_default_model: None,
            category_agent: "general".to_string(),
            unstable_model_families: vec!["gemini".to_string(), "minimax".to_string()],
            polling: PollingConfig::default(),
            categories: BTreeMap::new(),
            agents: Vec::new(),
        }
    }
}

/// Poll timing, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub poll_interval_ms: u64,
    pub sync_timeout_ms: u64,
    pub session_wait_interval_ms: u64,
    pub session_wait_timeout_ms: u64,
    /// Consecutive idle polls with an unchanged message count (supervised mode)
    pub stability_polls_required: u32,
    /// Polls before this much time has elapsed never count as stable
    pub min_stability_time_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            sync_timeout_ms: 10 * 60 * 1000,
            session_wait_interval_ms: 100,
            session_wait_timeout_ms: 30_000,
            stability_polls_required: 3,
            min_stability_time_ms: 10_000,
        }
    }
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn session_wait_interval(&self) -> Duration {
        Duration::from_millis(self.session_wait_interval_ms)
    }

    pub fn session_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.session_wait_timeout_ms)
    }

    pub fn min_stability_time(&self) -> Duration {
        Duration::from_millis(self.min_stability_time_ms)
    }
}

/// Category settings. Built-in categories use the same shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub description: Option<String>,
    pub model: Option<String>,
    pub variant: Option<String>,
    pub fallback_chain: Vec<FallbackEntry>,
    /// Always route synchronous calls through the supervised background path
    pub is_unstable_agent: bool,
    /// Refuse to run on anything but a resolved category/fallback model
    pub requires_model: bool,
}

/// Agent execution mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Subagent,
    Primary,
    All,
}

impl AgentMode {
    pub fn is_delegatable(self) -> bool {
        !matches!(self, Self::Primary)
    }
}

/// Agent settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub description: Option<String>,
    pub mode: AgentMode,
    pub model: Option<String>,
    pub variant: Option<String>,
    pub fallback_chain: Vec<FallbackEntry>,
    /// Deny file-mutating tools
    pub read_only: bool,
    /// Extra tools denied to this agent
    pub denied_tools: Vec<String>,
}

impl DelegateConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path. A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| DelegateError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        paths::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Whether a model id belongs to a family flagged as unstable.
    pub fn is_unstable_model(&self, model: &str) -> bool {
        let model = model.to_lowercase();
        self.unstable_model_families
            .iter()
            .any(|family| !family.is_empty() && model.contains(&family.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DelegateConfig::default();
        assert_eq!(config.category_agent, "general");
        assert_eq!(config.polling.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.polling.sync_timeout(), Duration::from_secs(600));
        assert_eq!(config.polling.stability_polls_required, 3);
        assert!(config.system_default_model.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
system_default_model = "anthropic/claude-sonnet-4-5"

[polling]
poll_interval_ms = 250

[categories.quick]
model = "openai/gpt-5-nano"

[categories.research]
description = "Long-form research"
requires_model = true
fallback_chain = [
    { providers = ["anthropic", "github-copilot"], model = "claude-opus-4-6", variant = "max" },
]

[[agents]]
name = "reviewer"
read_only = true
denied_tools = ["bash"]
"#;

        let config = DelegateConfig::from_toml(content).unwrap();
        assert_eq!(
            config.system_default_model.as_deref(),
            Some("anthropic/claude-sonnet-4-5")
        );
        assert_eq!(config.polling.poll_interval_ms, 250);
        assert_eq!(config.polling.sync_timeout_ms, 600_000);
        assert_eq!(
            config.categories["quick"].model.as_deref(),
            Some("openai/gpt-5-nano")
        );

        let research = &config.categories["research"];
        assert!(research.requires_model);
        assert_eq!(research.fallback_chain.len(), 1);
        assert_eq!(research.fallback_chain[0].variant.as_deref(), Some("max"));

        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].mode, AgentMode::Subagent);
        assert!(config.agents[0].read_only);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = DelegateConfig::load_from_path(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.category_agent, "general");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "polling = [not valid").unwrap();

        let err = DelegateConfig::load_from_path(&path).unwrap_err();
        assert!(matches!(err, DelegateError::Config(_)));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_unstable_model_families() {
        let config = DelegateConfig::default();
        assert!(config.is_unstable_model("google/Gemini-3-Pro"));
        assert!(config.is_unstable_model("minimax/MiniMax-M2"));
        assert!(!config.is_unstable_model("anthropic/claude-opus-4-6"));
    }
}
