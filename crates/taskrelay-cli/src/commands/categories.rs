use anyhow::Result;
use comfy_table::{Cell, Table};
use serde_json::json;
use taskrelay_core::{Catalog, DelegateConfig};

use crate::output::{OutputFormat, print_json, print_table};

pub fn run(config: &DelegateConfig, format: OutputFormat) -> Result<()> {
    let catalog = Catalog::from_config(config);

    if format.is_json() {
        let categories: Vec<_> = catalog
            .categories()
            .map(|category| {
                json!({
                    "name": category.name,
                    "description": category.description,
                    "model": category.user_model.as_ref().or(category.default_model.as_ref()),
                    "variant": category.variant,
                    "fallback_chain": category.fallback_chain.len(),
                    "unstable": category.is_unstable_agent,
                    "requires_model": category.requires_model,
                })
            })
            .collect();
        return print_json(&categories);
    }

    let mut table = Table::new();
    table.set_header(vec!["Name", "Model", "Variant", "Flags", "Description"]);

    for category in catalog.categories() {
        let model = match (&category.user_model, &category.default_model) {
            (Some(user), _) => format!("{user} (config)"),
            (None, Some(default)) => default.clone(),
            (None, None) => "(not set)".to_string(),
        };
        let mut flags = Vec::new();
        if category.requires_model {
            flags.push("requires-model");
        }
        if category.is_unstable_agent {
            flags.push("unstable");
        }
        table.add_row(vec![
            Cell::new(&category.name),
            Cell::new(model),
            Cell::new(category.variant.as_deref().unwrap_or("-")),
            Cell::new(flags.join(", ")),
            Cell::new(&category.description),
        ]);
    }

    print_table(&table);
    Ok(())
}
