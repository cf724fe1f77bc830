use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "taskrelay")]
#[command(version, about = "TaskRelay - delegate tasks to agent sessions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/taskrelay/config.toml)
    #[arg(long, global = true, env = "TASKRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show which model a category or agent resolves to
    Resolve(ResolveArgs),

    /// List task categories
    Categories,

    /// Delegate a task to a session server
    Run(RunArgs),
}

/// Exactly one dispatch target.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Task category (e.g. quick, deep)
    #[arg(long)]
    pub category: Option<String>,

    /// Subagent to run
    #[arg(long)]
    pub agent: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Model selected in the UI, overrides everything else
    #[arg(long)]
    pub ui_model: Option<String>,

    /// Directory holding provider-models.json and connected-providers.json
    #[arg(long, env = "TASKRELAY_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Session server base URL
    #[arg(long, env = "TASKRELAY_SERVER", default_value = "http://127.0.0.1:4096")]
    pub server: String,

    /// Session delegating the task
    #[arg(long)]
    pub parent_session: String,

    /// Working directory for the child session
    #[arg(long, default_value = ".")]
    pub directory: PathBuf,

    /// Task category
    #[arg(long, conflicts_with_all = ["agent", "session_id"])]
    pub category: Option<String>,

    /// Subagent to run
    #[arg(long, conflicts_with = "session_id")]
    pub agent: Option<String>,

    /// Continue an existing session
    #[arg(long)]
    pub session_id: Option<String>,

    /// Short task description
    #[arg(long)]
    pub description: String,

    /// Launch without waiting in the dispatcher
    #[arg(long)]
    pub background: bool,

    /// Model selected in the UI
    #[arg(long)]
    pub ui_model: Option<String>,

    /// Directory holding the provider caches
    #[arg(long, env = "TASKRELAY_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Instruction for the agent
    pub prompt: String,
}
