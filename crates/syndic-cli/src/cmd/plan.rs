//! The `plan` subcommand: report what a sync would change, computed
//! from catalog metadata alone. No artifact downloads, no writes.

use std::path::Path;

use anyhow::{Context, Result};

use syndic_core::config::Config;
use syndic_core::render::{BrewPlatform, Target};
use syndic_core::sync::{self, SyncOptions};

/// Fetch the catalog and print the per-target plans.
pub async fn plan(
    config_path: &Path,
    targets: Vec<Target>,
    platform: BrewPlatform,
) -> Result<i32> {
    let config = Config::load(config_path)
        .with_context(|| format!("Cannot load {}", config_path.display()))?;

    let options = SyncOptions {
        targets,
        platform,
        ..SyncOptions::default()
    };
    let summary = sync::plan_only(&config, &options).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary.exit_code())
}
