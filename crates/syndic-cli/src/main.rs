//! syndic - manifest synchronization for the OpenLyst catalog

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use syndic_cli::cmd;
use syndic_cli::{effective_targets, Cli, Commands};

use syndic_core::sync::SyncOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match cli.command {
        Commands::Sync {
            targets,
            platform,
            force,
            push,
            ssh_key,
        } => {
            let options = SyncOptions {
                targets: effective_targets(targets),
                platform,
                force,
                dry_run: cli.dry_run,
                push,
                aur_ssh_key: ssh_key,
            };
            cmd::sync::sync(&cli.config, options).await?
        }
        Commands::Plan { targets, platform } => {
            cmd::plan::plan(&cli.config, effective_targets(targets), platform).await?
        }
    };

    std::process::exit(code);
}
