use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cache;
mod cli;
mod config;
mod engine;
mod error;
mod output;
mod plan;
mod plugin;
mod runner;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose switches to debug
    let default_filter = if cli.verbose {
        "devplan=debug"
    } else {
        "devplan=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => cli::run::execute(args).await,
        Commands::Check(args) => cli::check::execute(args),
        Commands::Status(args) => cli::status::execute(args),
        Commands::Plugins(args) => cli::plugins::execute(args).await,
        Commands::Cache(args) => cli::cache::execute(args).await,
        Commands::Schema => cli::schema::execute(),
    }
}
