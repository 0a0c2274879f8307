//! Configuration for a sync run, parsed from `syndic.toml`.
//!
//! The roster of apps to republish lives here rather than in the
//! catalog: the catalog is queried once per configured slug, and the
//! static metadata (description, license, AUR packaging fields) rides
//! along from the config into each `AppRecord`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Policy for artifacts whose catalog record carries no declared digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DigestPolicy {
    /// Compute the digest from the fetched bytes and embed it as-is
    /// (trust-first-seen). The default.
    #[default]
    TrustComputed,
    /// Refuse to publish an entry whose upstream record declares no
    /// reference digest.
    RequireDeclared,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream catalog endpoint and retry tuning.
    pub catalog: CatalogConfig,
    /// Published repository metadata (AltStore/F-Droid headers,
    /// Winget source fields).
    pub repo: RepoConfig,
    /// Per-target output roots and preserved files.
    #[serde(default)]
    pub output: OutputConfig,
    /// How to treat artifacts with no upstream-declared digest.
    #[serde(default)]
    pub digest_policy: DigestPolicy,
    /// Apps to synchronize.
    #[serde(default, rename = "apps")]
    pub apps: Vec<AppEntry>,
}

impl Config {
    /// Load and parse a `syndic.toml` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Look up a roster entry by slug.
    pub fn app(&self, slug: &str) -> Option<&AppEntry> {
        self.apps.iter().find(|a| a.slug == slug)
    }
}

/// Upstream catalog API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL, e.g. `https://openlyst.ink`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bounded retry attempts for transient failures.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Worker pool size for concurrent fetch/verify tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Global deadline for the whole sync cycle, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_concurrency() -> usize {
    4
}

fn default_deadline_secs() -> u64 {
    900
}

/// Metadata describing the published repository itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Repository display name.
    pub name: String,
    /// Short subtitle.
    #[serde(default)]
    pub subtitle: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// Public website of the catalog.
    #[serde(default)]
    pub website: String,
    /// Static base URL where the AltStore repo is hosted.
    pub base_url: String,
    /// Default tint color for AltStore entries.
    #[serde(default = "default_tint")]
    pub tint_color: String,
    /// Winget package identifier namespace prefix (e.g. "OpenLyst").
    #[serde(default = "default_namespace")]
    pub winget_namespace: String,
    /// Base URL where the Winget REST source will be hosted.
    #[serde(default)]
    pub winget_base_url: String,
    /// F-Droid repository address.
    #[serde(default)]
    pub fdroid_address: String,
    /// Maintainer line for generated AUR files
    /// (e.g. "OpenLyst <contact@openlyst.ink>").
    #[serde(default)]
    pub maintainer: String,
}

fn default_tint() -> String {
    "#dc2626".to_string()
}

fn default_namespace() -> String {
    "OpenLyst".to_string()
}

/// Output tree roots, one per target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// AltStore repo directory (contains `apps.json`).
    #[serde(default = "default_altstore_dir")]
    pub altstore: PathBuf,
    /// F-Droid repo directory (contains `index-v1.json`).
    #[serde(default = "default_fdroid_dir")]
    pub fdroid: PathBuf,
    /// Homebrew tap directory (contains `Formula/` and `Casks/`).
    #[serde(default = "default_homebrew_dir")]
    pub homebrew: PathBuf,
    /// Winget REST source directory.
    #[serde(default = "default_winget_dir")]
    pub winget: PathBuf,
    /// AUR working directory (one subdirectory per package).
    #[serde(default = "default_aur_dir")]
    pub aur: PathBuf,
    /// Files carried over from the previous tree even when absent from
    /// the new output set (hand-maintained assets).
    #[serde(default = "default_preserve")]
    pub preserve: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            altstore: default_altstore_dir(),
            fdroid: default_fdroid_dir(),
            homebrew: default_homebrew_dir(),
            winget: default_winget_dir(),
            aur: default_aur_dir(),
            preserve: default_preserve(),
        }
    }
}

fn default_altstore_dir() -> PathBuf {
    PathBuf::from("repo")
}

fn default_fdroid_dir() -> PathBuf {
    PathBuf::from("fdroid")
}

fn default_homebrew_dir() -> PathBuf {
    PathBuf::from("homebrew-tap")
}

fn default_winget_dir() -> PathBuf {
    PathBuf::from("winget-source")
}

fn default_aur_dir() -> PathBuf {
    PathBuf::from("aur")
}

fn default_preserve() -> Vec<String> {
    vec![
        "README.md".to_string(),
        "icon.png".to_string(),
        "header.png".to_string(),
    ]
}

/// One app in the sync roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEntry {
    /// Catalog slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Human description.
    pub description: String,
    /// License string (e.g. "GPL3", "AGPL3").
    pub license: String,
    /// Upstream source / homepage URL.
    pub homepage: String,
    /// Optional short tagline.
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Optional reverse-DNS bundle identifier.
    #[serde(default)]
    pub bundle_identifier: Option<String>,
    /// Optional store category.
    #[serde(default)]
    pub category: Option<String>,
    /// Optional AUR packaging block; apps without one are skipped by
    /// the AUR target.
    #[serde(default)]
    pub aur: Option<AurPackaging>,
}

/// AUR-specific packaging fields for one app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AurPackaging {
    /// AUR package name (e.g. `finar-bin`).
    pub package_name: String,
    /// Runtime dependencies.
    #[serde(default)]
    pub depends: Vec<String>,
    /// Conflicting package names.
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Provided package names.
    #[serde(default)]
    pub provides: Vec<String>,
}
