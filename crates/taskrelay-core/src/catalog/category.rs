//! Task categories: built-in defaults overlaid with user configuration.

use std::collections::BTreeMap;

use taskrelay_traits::FallbackEntry;

use crate::config::CategoryConfig;

/// A resolved category definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub description: String,
    /// Built-in default model (resolution step 3)
    pub default_model: Option<String>,
    /// Model from the user's config (resolution step 2)
    pub user_model: Option<String>,
    pub variant: Option<String>,
    pub fallback_chain: Vec<FallbackEntry>,
    pub is_unstable_agent: bool,
    pub requires_model: bool,
}

impl Category {
    fn from_config(name: &str, config: &CategoryConfig) -> Self {
        Self {
            name: name.to_string(),
            description: config.description.clone().unwrap_or_default(),
            default_model: None,
            user_model: config.model.clone(),
            variant: config.variant.clone(),
            fallback_chain: config.fallback_chain.clone(),
            is_unstable_agent: config.is_unstable_agent,
            requires_model: config.requires_model,
        }
    }

    /// Apply a user config entry on top of a built-in category.
    fn overlay(&mut self, config: &CategoryConfig) {
        if let Some(description) = &config.description {
            self.description = description.clone();
        }
        if config.model.is_some() {
            self.user_model = config.model.clone();
        }
        if config.variant.is_some() {
            self.variant = config.variant.clone();
        }
        if !config.fallback_chain.is_empty() {
            self.fallback_chain = config.fallback_chain.clone();
        }
        self.is_unstable_agent |= config.is_unstable_agent;
        self.requires_model |= config.requires_model;
    }
}

struct BuiltinCategory {
    name: &'static str,
    description: &'static str,
    model: &'static str,
    variant: Option<&'static str>,
    chain: &'static [(&'static [&'static str], &'static str, Option<&'static str>)],
    requires_model: bool,
}

const BUILTIN_CATEGORIES: &[BuiltinCategory] = &[
    BuiltinCategory {
        name: "quick",
        description: "Trivial, well-scoped changes: typo fixes, single-file edits",
        model: "anthropic/claude-haiku-4-5",
        variant: None,
        chain: &[
            (&["anthropic", "github-copilot", "opencode"], "claude-haiku-4-5", None),
            (&["google", "github-copilot", "opencode"], "gemini-3-flash", None),
            (&["opencode"], "gpt-5-nano", None),
        ],
        requires_model: false,
    },
    BuiltinCategory {
        name: "deep",
        description: "Goal-oriented autonomous problem solving with thorough research",
        model: "openai/gpt-5.2-codex",
        variant: Some("medium"),
        chain: &[
            (&["openai", "opencode"], "gpt-5.2-codex", Some("medium")),
            (&["anthropic", "github-copilot", "opencode"], "claude-opus-4-6", Some("max")),
        ],
        requires_model: true,
    },
    BuiltinCategory {
        name: "ultrabrain",
        description: "Hard logic-heavy tasks that need maximum reasoning",
        model: "openai/gpt-5.2-codex",
        variant: Some("xhigh"),
        chain: &[
            (&["openai", "opencode"], "gpt-5.2-codex", Some("xhigh")),
            (&["google", "github-copilot", "opencode"], "gemini-3-pro", Some("high")),
            (&["anthropic", "github-copilot", "opencode"], "claude-opus-4-6", Some("max")),
        ],
        requires_model: false,
    },
    BuiltinCategory {
        name: "visual-engineering",
        description: "Frontend, UI/UX, design and styling work",
        model: "google/gemini-3-pro",
        variant: None,
        chain: &[
            (&["google", "github-copilot", "opencode"], "gemini-3-pro", None),
            (&["zai-coding-plan", "opencode"], "glm-5", None),
            (&["anthropic", "github-copilot", "opencode"], "claude-opus-4-6", Some("max")),
        ],
        requires_model: false,
    },
    BuiltinCategory {
        name: "writing",
        description: "Documentation, prose and technical writing",
        model: "google/gemini-3-flash",
        variant: None,
        chain: &[
            (&["google", "github-copilot", "opencode"], "gemini-3-flash", None),
            (&["anthropic", "github-copilot", "opencode"], "claude-sonnet-4-5", None),
        ],
        requires_model: false,
    },
];

fn builtin(def: &BuiltinCategory) -> Category {
    Category {
        name: def.name.to_string(),
        description: def.description.to_string(),
        default_model: Some(def.model.to_string()),
        user_model: None,
        variant: def.variant.map(str::to_string),
        fallback_chain: def
            .chain
            .iter()
            .map(|(providers, model, variant)| {
                let entry = FallbackEntry::new(providers.iter().copied(), *model);
                match variant {
                    Some(variant) => entry.with_variant(*variant),
                    None => entry,
                }
            })
            .collect(),
        is_unstable_agent: false,
        requires_model: def.requires_model,
    }
}

/// Built-in categories merged with user entries, keyed by name.
pub fn build_categories(user: &BTreeMap<String, CategoryConfig>) -> BTreeMap<String, Category> {
    let mut categories: BTreeMap<String, Category> = BUILTIN_CATEGORIES
        .iter()
        .map(|def| (def.name.to_string(), builtin(def)))
        .collect();

    for (name, config) in user {
        match categories.get_mut(name) {
            Some(category) => category.overlay(config),
            None => {
                categories.insert(name.clone(), Category::from_config(name, config));
            }
        }
    }

    categories
}
