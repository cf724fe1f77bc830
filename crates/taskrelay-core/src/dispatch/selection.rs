//! Agent and model selection for new tasks.

use taskrelay_traits::{
    AvailabilitySnapshot, DelegateError, ModelCandidate, Provenance, ResolutionIntent,
    ResolutionPolicy, ResolutionRequest, ResolutionResult, Result,
};
use tracing::info;

use super::args::TaskTarget;
use crate::catalog::{Agent, Catalog, Category};
use crate::config::DelegateConfig;
use crate::resolution::resolve;

/// Available models listed in a "required model unavailable" error.
const MAX_LISTED_MODELS: usize = 20;

/// Who runs a new task and on which model.
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub agent: Agent,
    pub category: Option<Category>,
    /// `None` lets the host pick its default model
    pub resolution: Option<ResolutionResult>,
    pub model: Option<ModelCandidate>,
    /// Model is known to misbehave under synchronous polling
    pub unstable: bool,
}

impl ModelSelection {
    pub fn provenance(&self) -> Option<Provenance> {
        self.resolution.as_ref().map(|resolution| resolution.provenance)
    }
}

/// Pick agent, category and model for a category or agent target.
pub fn select_model(
    catalog: &Catalog,
    config: &DelegateConfig,
    target: &TaskTarget,
    ui_selected_model: Option<&str>,
    availability: &AvailabilitySnapshot,
) -> Result<ModelSelection> {
    let (agent, category) = match target {
        TaskTarget::Category(name) => {
            let category = catalog.category(name)?;
            (catalog.agent(&config.category_agent)?, Some(category))
        }
        TaskTarget::Agent(name) => (catalog.agent(name)?, None),
        TaskTarget::Continue(session_id) => {
            return Err(DelegateError::InvalidArguments(format!(
                "Session {session_id} is continued with its own model"
            )));
        }
    };

    let request = ResolutionRequest {
        intent: ResolutionIntent {
            ui_selected_model: ui_selected_model.map(str::to_string),
            user_model: category
                .and_then(|category| category.user_model.clone())
                .or_else(|| agent.model.clone()),
            category_default_model: category.and_then(|category| category.default_model.clone()),
        },
        constraints: availability.clone(),
        policy: ResolutionPolicy {
            fallback_chain: match category {
                Some(category) => category.fallback_chain.clone(),
                None => agent.fallback_chain.clone(),
            },
            system_default_model: config.system_default_model.clone(),
        },
    };

    let resolution = resolve(&request);

    if let Some(category) = category
        && category.requires_model
        && resolution
            .as_ref()
            .is_none_or(|resolution| resolution.provenance == Provenance::SystemDefault)
    {
        return Err(required_model_error(category, resolution.as_ref(), availability));
    }

    let model = match &resolution {
        Some(resolution) => {
            let configured_variant = category
                .and_then(|category| category.variant.clone())
                .or_else(|| agent.variant.clone());
            let variant = match resolution.provenance {
                Provenance::ProviderFallback => resolution.variant.clone(),
                Provenance::SystemDefault => None,
                Provenance::Override | Provenance::CategoryDefault => configured_variant,
            };
            let model = ModelCandidate::parse(&resolution.model).ok_or_else(|| {
                DelegateError::Resolution(format!(
                    "Invalid model \"{}\" ({}): expected \"provider/model\"",
                    resolution.model, resolution.provenance
                ))
            })?;
            Some(model.with_variant(variant))
        }
        None => None,
    };

    let unstable = category.is_some_and(|category| category.is_unstable_agent)
        || model
            .as_ref()
            .is_some_and(|model| config.is_unstable_model(&model.full_id()));

    info!(
        agent = %agent.name,
        category = category.map(|category| category.name.as_str()),
        model = model.as_ref().map(ModelCandidate::full_id),
        provenance = resolution.as_ref().map(|resolution| resolution.provenance.as_str()),
        unstable,
        "Model selected"
    );

    Ok(ModelSelection {
        agent: agent.clone(),
        category: category.cloned(),
        resolution,
        model,
        unstable,
    })
}

fn required_model_error(
    category: &Category,
    resolution: Option<&ResolutionResult>,
    availability: &AvailabilitySnapshot,
) -> DelegateError {
    let required = category
        .user_model
        .as_deref()
        .or(category.default_model.as_deref())
        .or_else(|| {
            category
                .fallback_chain
                .first()
                .map(|entry| entry.model.as_str())
        })
        .unwrap_or("(none configured)");

    let mut message = format!(
        "Category \"{}\" requires a model but none of its models is available.\n\
         Required: {}",
        category.name, required
    );

    if let Some(resolution) = resolution
        && !resolution.attempted.is_empty()
    {
        message.push_str(&format!("\nTried: {}", resolution.attempted.join(", ")));
    }

    match availability.models.models() {
        Some(models) if !models.is_empty() => {
            let listed: Vec<&str> = models
                .iter()
                .take(MAX_LISTED_MODELS)
                .map(String::as_str)
                .collect();
            message.push_str(&format!("\nAvailable models: {}", listed.join(", ")));
            if models.len() > MAX_LISTED_MODELS {
                message.push_str(&format!(" (and {} more)", models.len() - MAX_LISTED_MODELS));
            }
        }
        Some(_) => message.push_str("\nNo models are available. Connect a provider first."),
        None => message.push_str("\nModel availability has not been checked yet."),
    }

    message.push_str(&format!(
        "\nSet `model` under [categories.{}] in the config to choose one explicitly.",
        category.name
    ));
    DelegateError::Resolution(message)
}
