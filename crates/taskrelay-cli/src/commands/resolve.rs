use anyhow::Result;
use serde_json::json;
use taskrelay_core::dispatch::{TaskTarget, select_model};
use taskrelay_core::{Catalog, DelegateConfig};

use crate::cli::ResolveArgs;
use crate::output::{OutputFormat, print_json};

pub async fn run(config: &DelegateConfig, args: ResolveArgs, format: OutputFormat) -> Result<()> {
    let target = match (args.target.category, args.target.agent) {
        (Some(category), _) => TaskTarget::Category(category),
        (None, Some(agent)) => TaskTarget::Agent(agent),
        (None, None) => anyhow::bail!("Pass --category or --agent"),
    };

    let catalog = Catalog::from_config(config);
    let snapshot = super::snapshot(args.cache_dir).await;
    let selection = select_model(
        &catalog,
        config,
        &target,
        args.ui_model.as_deref(),
        &snapshot,
    )?;
    let attempted = selection
        .resolution
        .as_ref()
        .map(|resolution| resolution.attempted.clone())
        .unwrap_or_default();

    if format.is_json() {
        return print_json(&json!({
            "agent": selection.agent.name,
            "category": selection.category.as_ref().map(|category| &category.name),
            "model": selection.model.as_ref().map(|model| model.full_id()),
            "variant": selection.model.as_ref().and_then(|model| model.variant.clone()),
            "provenance": selection.provenance(),
            "attempted": attempted,
            "unstable": selection.unstable,
        }));
    }

    println!("Agent: {}", selection.agent.name);
    if let Some(category) = &selection.category {
        println!("Category: {}", category.name);
    }
    match (&selection.model, selection.provenance()) {
        (Some(model), Some(provenance)) => println!("Model: {} ({provenance})", model.full_id()),
        (Some(model), None) => println!("Model: {}", model.full_id()),
        (None, _) => println!("Model: no opinion, the host picks its default"),
    }
    if let Some(variant) = selection.model.as_ref().and_then(|model| model.variant.as_deref()) {
        println!("Variant: {variant}");
    }
    if !attempted.is_empty() {
        println!("Tried: {}", attempted.join(", "));
    }
    if selection.unstable {
        println!("Unstable: yes (synchronous calls are supervised)");
    }
    Ok(())
}
