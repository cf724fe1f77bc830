use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use taskrelay_core::{
    DelegateConfig, DelegateTaskArgs, HttpSessionBackend, LocalBackgroundManager, ParentContext,
    TaskDispatcher,
};
use taskrelay_traits::{BackgroundManager, SessionBackend, TaskOutcome, TaskStatus};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::RunArgs;
use crate::output::{OutputFormat, print_json};

pub async fn run(config: DelegateConfig, args: RunArgs, format: OutputFormat) -> Result<()> {
    let backend: Arc<dyn SessionBackend> = Arc::new(HttpSessionBackend::new(&args.server));
    let background = LocalBackgroundManager::new(backend.clone(), config.polling.clone());
    let wait_interval = config.polling.poll_interval();

    let dispatcher = TaskDispatcher::new(config, backend, Arc::new(background.clone()))
        .with_availability(super::availability(args.cache_dir.clone()));

    let directory = std::path::absolute(&args.directory)
        .with_context(|| format!("Invalid directory: {}", args.directory.display()))?;
    let parent = ParentContext {
        session_id: args.parent_session,
        directory: directory.display().to_string(),
        agent: None,
        ui_selected_model: args.ui_model,
    };
    let request = DelegateTaskArgs {
        description: args.description,
        prompt: args.prompt,
        category: args.category,
        subagent_type: args.agent,
        run_in_background: Some(args.background),
        session_id: args.session_id,
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling dispatch");
            trigger.cancel();
        }
    });

    let report = dispatcher.execute(&request, &parent, &cancel).await?;
    if format.is_json() {
        print_json(&report)?;
    } else {
        println!("{}", report.output);
    }

    // Background tasks live in this process, so stay until they finish.
    let Some(task_id) = report
        .metadata
        .task_id
        .as_deref()
        .filter(|_| report.outcome == TaskOutcome::Launched)
    else {
        return Ok(());
    };

    let finished = tokio::select! {
        _ = cancel.cancelled() => {
            background.cancel(task_id);
            None
        }
        task = background.wait(task_id, wait_interval) => task,
    };

    let result = background.result(task_id);
    if format.is_json() {
        return print_json(&json!({
            "task_id": task_id,
            "status": finished.as_ref().map(|task| task.status),
            "result": result,
            "error": finished.as_ref().and_then(|task| task.error.clone()),
        }));
    }

    match finished {
        Some(task) if task.status == TaskStatus::Completed => {
            println!("\n---\n\n{}", result.unwrap_or_default());
        }
        Some(task) => {
            let error = task.error.unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("Background task {task_id} failed: {error}");
        }
        None => println!("\nBackground task {task_id} cancelled."),
    }
    Ok(())
}
