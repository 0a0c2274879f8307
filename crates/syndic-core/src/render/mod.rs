//! Target renderers.
//!
//! Each renderer is a pure mapping from a [`RenderPlan`] to a
//! [`TargetOutput`]; no network or filesystem access happens here.
//! The closed set of targets is dispatched through [`render`]. A
//! failure in one target never blocks the others - the pipeline calls
//! each renderer in isolation.

pub mod altstore;
pub mod aur;
pub mod fdroid;
pub mod homebrew;
pub mod winget;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use syndic_schema::AppSlug;

use crate::config::Config;
use crate::plan::RenderPlan;
use crate::state::ManifestState;

/// One output package-distribution format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// AltStore JSON feed (`apps.json` + `index.json`).
    Altstore,
    /// F-Droid repository index.
    Fdroid,
    /// Homebrew formulae and casks.
    Homebrew,
    /// Winget REST source document set.
    Winget,
    /// AUR `PKGBUILD`/`.SRCINFO` pairs.
    Aur,
}

impl Target {
    /// All targets, in rendering order.
    pub const ALL: [Self; 5] = [
        Self::Altstore,
        Self::Fdroid,
        Self::Homebrew,
        Self::Winget,
        Self::Aur,
    ];

    /// CLI name of this target.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Altstore => "altstore",
            Self::Fdroid => "fdroid",
            Self::Homebrew => "homebrew",
            Self::Winget => "winget",
            Self::Aur => "aur",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "altstore" => Ok(Self::Altstore),
            "fdroid" | "f-droid" => Ok(Self::Fdroid),
            "homebrew" | "brew" => Ok(Self::Homebrew),
            "winget" => Ok(Self::Winget),
            "aur" => Ok(Self::Aur),
            _ => Err(format!("Unknown target: {s}")),
        }
    }
}

/// Platform selection for the Homebrew target: the same app record
/// yields cask syntax for macOS and formula syntax for Linux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrewPlatform {
    /// Render casks only.
    Macos,
    /// Render formulae only.
    Linux,
    /// Render both trees.
    #[default]
    Both,
}

impl BrewPlatform {
    /// Whether cask rendering is requested.
    pub fn includes_macos(self) -> bool {
        matches!(self, Self::Macos | Self::Both)
    }

    /// Whether formula rendering is requested.
    pub fn includes_linux(self) -> bool {
        matches!(self, Self::Linux | Self::Both)
    }
}

impl std::str::FromStr for BrewPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "macos" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            "both" => Ok(Self::Both),
            _ => Err(format!("Unknown platform: {s} (expected macOS, Linux or both)")),
        }
    }
}

/// Rendering failures.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The newly derived F-Droid version code is lower than the
    /// previously published one.
    #[error(
        "version code regression for '{slug}': published {previous}, derived {derived}"
    )]
    VersionCodeRegression {
        /// App whose version code would regress.
        slug: AppSlug,
        /// Previously published version code.
        previous: i64,
        /// Code derived from the new version string.
        derived: i64,
    },

    /// JSON serialization failed (a bug, not a data condition).
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// The complete file set one target publishes, relative paths mapped
/// to content bytes. Applied all-or-nothing by the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutput {
    /// Target this output belongs to.
    pub target: Target,
    /// Ordered (path, content) pairs.
    pub files: BTreeMap<PathBuf, Vec<u8>>,
}

impl TargetOutput {
    /// Empty output set for a target.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            files: BTreeMap::new(),
        }
    }

    /// Add one file to the output set.
    pub fn add(&mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }
}

/// Shared read-only inputs for all renderers.
///
/// `generated_at` is supplied once per cycle by the pipeline so that
/// renderers stay pure and tests can pin timestamps.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Run configuration (repo metadata, roster, namespaces).
    pub config: &'a Config,
    /// Homebrew platform selection.
    pub platform: BrewPlatform,
    /// Previous snapshot of the target being rendered (F-Droid needs
    /// the published version codes).
    pub previous: &'a ManifestState,
    /// Cycle timestamp embedded in generated manifests.
    pub generated_at: DateTime<Utc>,
}

/// Output of one renderer: the file set plus per-app errors for
/// entries that had to be dropped (these never fail the whole target).
#[derive(Debug)]
pub struct RenderOutcome {
    /// Files to publish.
    pub output: TargetOutput,
    /// Apps whose fresh record could not be rendered, with the reason.
    /// The app may still appear in the output at its previously
    /// published version.
    pub skipped: Vec<(AppSlug, RenderError)>,
    /// Number of apps that made it into the output.
    pub rendered: usize,
}

/// Render one target's plan into its output file set.
///
/// # Errors
///
/// Returns an error only for target-level failures (serialization
/// bugs); per-app conditions are reported in
/// [`RenderOutcome::skipped`].
pub fn render(plan: &RenderPlan<'_>, ctx: &RenderContext<'_>) -> Result<RenderOutcome, RenderError> {
    match plan.target {
        Target::Altstore => altstore::render(plan, ctx),
        Target::Fdroid => fdroid::render(plan, ctx),
        Target::Homebrew => homebrew::render(plan, ctx),
        Target::Winget => winget::render(plan, ctx),
        Target::Aur => aur::render(plan, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names_round_trip() {
        for t in Target::ALL {
            assert_eq!(t.as_str().parse::<Target>().unwrap(), t);
        }
    }

    #[test]
    fn brew_platform_parses_spec_spellings() {
        assert_eq!("macOS".parse::<BrewPlatform>().unwrap(), BrewPlatform::Macos);
        assert_eq!("Linux".parse::<BrewPlatform>().unwrap(), BrewPlatform::Linux);
        assert_eq!("both".parse::<BrewPlatform>().unwrap(), BrewPlatform::Both);
    }
}
