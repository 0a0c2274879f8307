//! The `sync` subcommand: run one full cycle and print the summary.

use std::path::Path;

use anyhow::{Context, Result};

use syndic_core::config::Config;
use syndic_core::sync::{self, SyncOptions};

/// Run a sync cycle and return the process exit code.
pub async fn sync(config_path: &Path, options: SyncOptions) -> Result<i32> {
    let config = Config::load(config_path)
        .with_context(|| format!("Cannot load {}", config_path.display()))?;

    let summary = sync::run(&config, &options).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary.exit_code())
}
