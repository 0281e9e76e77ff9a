use anyhow::{Context, Result};
use clap::Parser;
use conclave_cli::cli::{Cli, Commands};
use conclave_cli::{commands, init_tracing};
use coordination::config::ConclaveConfig;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = ConclaveConfig::load_optional(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Consensus(args) => commands::consensus::run(args, &config).await,
        Commands::AutoReview(args) => commands::auto_review::run(args, &config).await,
        Commands::RalphRun(args) => commands::ralph_run::run(args, &config).await,
    }
}
