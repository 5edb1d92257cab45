pub mod cache;
pub mod check;
pub mod plugins;
pub mod run;
pub mod schema;
pub mod status;

use crate::config::Config;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "devplan")]
#[command(
    author,
    version,
    about = "Execute markdown development plans through pluggable task handlers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute the plan's pending tasks
    Run(RunArgs),

    /// Parse the plan and report its structure and warnings
    Check(PlanArgs),

    /// Show completion progress per phase and section
    Status(PlanArgs),

    /// List registered plugins
    Plugins(PluginsArgs),

    /// Inspect or clear the result cache
    Cache(CacheArgs),

    /// Print JSON Schema for config validation
    Schema,
}

#[derive(Args, Clone)]
pub struct ConfigArg {
    /// Path to config file (defaults apply when missing)
    #[arg(short, long, default_value = "devplan.yaml", env = "DEVPLAN_CONFIG")]
    pub config: PathBuf,
}

#[derive(Args, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Plan file (overrides config)
    #[arg(short, long)]
    pub plan: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Run a single phase only (e.g. phase-2)
    #[arg(long)]
    pub phase: Option<String>,

    /// Override max parallel tasks per batch
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Override output directory
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Ignore and don't update the result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Leave the plan file untouched
    #[arg(long)]
    pub no_write_back: bool,

    /// Walk the plan without invoking plugins
    #[arg(long)]
    pub dry_run: bool,

    /// Exit 1 if any task failed (CI mode)
    #[arg(long)]
    pub fail_on_error: bool,
}

#[derive(Args, Clone)]
pub struct PluginsArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Show per-plugin statistics from the latest run report
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Clone)]
pub struct CacheArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Clone)]
pub enum CacheAction {
    /// Show cache size and location
    Stats,

    /// Remove every cached result
    Clear,
}

/// Load the config (or defaults), apply the plan override and validate
pub(crate) fn load_config(config: &Path, plan: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(config)
        .with_context(|| format!("Failed to load config {}", config.display()))?;
    if let Some(plan) = plan {
        config.plan = plan.clone();
    }
    config.validate()?;
    Ok(config)
}
