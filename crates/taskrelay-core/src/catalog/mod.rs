//! Category and agent catalogs.

mod agent;
mod category;

use std::collections::BTreeMap;

use taskrelay_traits::{DelegateError, Result};

use crate::config::DelegateConfig;

pub use agent::Agent;
pub use category::Category;

/// Lookup tables for categories and agents, built once from configuration.
#[derive(Debug, Clone)]
pub struct Catalog {
    categories: BTreeMap<String, Category>,
    agents: BTreeMap<String, Agent>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::from_config(&DelegateConfig::default())
    }
}

impl Catalog {
    pub fn from_config(config: &DelegateConfig) -> Self {
        Self {
            categories: category::build_categories(&config.categories),
            agents: agent::build_agents(&config.agents),
        }
    }

    /// Look up a category by exact name.
    pub fn category(&self, name: &str) -> Result<&Category> {
        self.categories.get(name).ok_or_else(|| {
            let available: Vec<&str> = self.categories.keys().map(String::as_str).collect();
            DelegateError::Resolution(format!(
                "Unknown category: \"{}\". Available: {}",
                name,
                available.join(", ")
            ))
        })
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// Look up an agent that tasks may be delegated to. Case-insensitive.
    pub fn agent(&self, name: &str) -> Result<&Agent> {
        let key = name.trim().to_lowercase();
        let agent = self.agents.get(&key).ok_or_else(|| {
            DelegateError::Resolution(format!(
                "Unknown agent: \"{}\". Available agents: {}",
                name.trim(),
                self.callable_agent_names().join(", ")
            ))
        })?;

        if !agent.mode.is_delegatable() {
            return Err(DelegateError::InvalidArguments(format!(
                "Cannot delegate to primary agent \"{}\". Primary agents run top-level \
                 sessions; use one of: {}",
                agent.name,
                self.callable_agent_names().join(", ")
            )));
        }

        Ok(agent)
    }

    /// Agent settings regardless of mode, used when continuing a session.
    pub fn find_agent(&self, name: &str) -> Option<&Agent> {
        self.agents.get(&name.trim().to_lowercase())
    }

    pub fn callable_agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents
            .values()
            .filter(|agent| agent.mode.is_delegatable())
    }

    fn callable_agent_names(&self) -> Vec<&str> {
        self.callable_agents()
            .map(|agent| agent.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_lists_available() {
        let catalog = Catalog::default();
        let err = catalog.category("nope").unwrap_err();
        assert!(matches!(err, DelegateError::Resolution(_)));
        let text = err.to_string();
        assert!(text.contains("\"nope\""));
        assert!(text.contains("quick"));
        assert!(text.contains("visual-engineering"));
    }

    #[test]
    fn test_agent_lookup_is_case_insensitive() {
        let catalog = Catalog::default();
        assert_eq!(catalog.agent("EXPLORE").unwrap().name, "explore");
    }

    #[test]
    fn test_primary_agent_is_rejected() {
        let catalog = Catalog::default();
        let err = catalog.agent("build").unwrap_err();
        assert!(matches!(err, DelegateError::InvalidArguments(_)));
        assert!(catalog.find_agent("build").is_some());
    }

    #[test]
    fn test_unknown_agent_lists_callable() {
        let catalog = Catalog::default();
        let text = catalog.agent("ghost").unwrap_err().to_string();
        assert!(text.contains("general"));
        assert!(text.contains("oracle"));
        assert!(!text.contains("build"));
    }
}
