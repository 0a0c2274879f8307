//! syndic - manifest synchronization for the OpenLyst catalog
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Fetches the latest app metadata from the catalog API and
//! republishes it as AltStore, F-Droid, Homebrew, Winget and AUR
//! manifests.

pub mod cmd;

pub use syndic_core::render::{BrewPlatform, Target};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "syndic")]
#[command(author, version, about = "Synchronize catalog apps into package manifests")]
pub struct Cli {
    /// Show what would happen without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Verbose logging (equivalent to RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "syndic.toml", env = "SYNDIC_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch the catalog and publish the selected targets
    Sync {
        /// Targets to publish (comma-separated); all when omitted
        #[arg(long = "target", value_delimiter = ',')]
        targets: Vec<Target>,

        /// Homebrew platform selection
        #[arg(long, default_value = "both")]
        platform: BrewPlatform,

        /// Re-render entries even when nothing changed
        #[arg(long)]
        force: bool,

        /// Push changed AUR packages to their git remotes
        #[arg(long)]
        push: bool,

        /// SSH private key for AUR pushes (handed to git, never read)
        #[arg(long, env = "SYNDIC_AUR_SSH_KEY")]
        ssh_key: Option<PathBuf>,
    },

    /// Fetch the catalog and report what sync would change
    Plan {
        /// Targets to inspect (comma-separated); all when omitted
        #[arg(long = "target", value_delimiter = ',')]
        targets: Vec<Target>,

        /// Homebrew platform selection
        #[arg(long, default_value = "both")]
        platform: BrewPlatform,
    },
}

/// Expand an empty target selection into the full set.
pub fn effective_targets(targets: Vec<Target>) -> Vec<Target> {
    if targets.is_empty() {
        Target::ALL.to_vec()
    } else {
        targets
    }
}
