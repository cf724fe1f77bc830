//! Agents that tasks can be delegated to.

use std::collections::BTreeMap;

use taskrelay_traits::FallbackEntry;

use crate::config::{AgentConfig, AgentMode};

/// A resolved agent definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub name: String,
    pub description: String,
    pub mode: AgentMode,
    /// Configured model, acts as the user override
    pub model: Option<String>,
    pub variant: Option<String>,
    pub fallback_chain: Vec<FallbackEntry>,
    pub read_only: bool,
    pub denied_tools: Vec<String>,
}

impl From<&AgentConfig> for Agent {
    fn from(config: &AgentConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone().unwrap_or_default(),
            mode: config.mode,
            model: config.model.clone(),
            variant: config.variant.clone(),
            fallback_chain: config.fallback_chain.clone(),
            read_only: config.read_only,
            denied_tools: config.denied_tools.clone(),
        }
    }
}

fn builtin(name: &str, description: &str, mode: AgentMode, read_only: bool) -> Agent {
    Agent {
        name: name.to_string(),
        description: description.to_string(),
        mode,
        model: None,
        variant: None,
        fallback_chain: Vec::new(),
        read_only,
        denied_tools: Vec::new(),
    }
}

fn builtin_agents() -> Vec<Agent> {
    vec![
        builtin(
            "general",
            "General-purpose agent for multi-step research and implementation",
            AgentMode::Subagent,
            false,
        ),
        builtin(
            "explore",
            "Fast read-only codebase exploration",
            AgentMode::Subagent,
            true,
        ),
        builtin(
            "oracle",
            "Read-only consultant for architecture and hard debugging",
            AgentMode::Subagent,
            true,
        ),
        builtin("build", "Primary build agent", AgentMode::Primary, false),
        builtin("plan", "Primary planning agent", AgentMode::Primary, true),
    ]
}

/// Built-in agents merged with configured ones, keyed by lowercase name.
/// A configured agent with a built-in's name replaces it.
pub fn build_agents(user: &[AgentConfig]) -> BTreeMap<String, Agent> {
    let mut agents: BTreeMap<String, Agent> = builtin_agents()
        .into_iter()
        .map(|agent| (agent.name.to_lowercase(), agent))
        .collect();

    for config in user {
        let name = config.name.trim();
        if name.is_empty() {
            continue;
        }
        agents.insert(name.to_lowercase(), Agent::from(config));
    }

    agents
}
