//! Previously-published state, recovered from the target trees.
//!
//! No separate state database exists: the published manifests are the
//! state. Before planning, each target's tree is re-parsed into a
//! [`ManifestState`] keyed by slug. Parsing is roster-driven and never
//! fails - an unreadable or malformed file just yields no entry, which
//! the planner classifies as [`New`](crate::plan::PlanReason::New) and
//! regenerates.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;
use tracing::debug;

use syndic_schema::{AppSlug, Sha256Digest, Version};

use crate::config::{AppEntry, Config};
use crate::render::{fdroid, winget, Target};

/// What one target last published for one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    /// Published version string.
    pub version: Version,
    /// Digests embedded in the published manifests (possibly a subset
    /// of the app's artifacts - targets embed different platforms).
    pub digests: BTreeSet<Sha256Digest>,
    /// Published F-Droid version code, when the target carries one.
    pub version_code: Option<i64>,
}

/// A previously published F-Droid entry, retained verbatim so a
/// version-code regression can republish it instead of erasing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FdroidCarryover {
    pub(crate) app: fdroid::AppJson,
    pub(crate) packages: Vec<fdroid::PackageJson>,
}

/// Snapshot of one target's published tree.
#[derive(Debug, Clone, Default)]
pub struct ManifestState {
    /// Entries keyed by app slug.
    pub entries: BTreeMap<AppSlug, StateEntry>,
    /// Raw F-Droid index entries, keyed by slug. Empty for other
    /// targets.
    pub(crate) fdroid_carryover: BTreeMap<AppSlug, FdroidCarryover>,
}

impl ManifestState {
    /// A snapshot with no entries (first run, or unreadable tree).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Recover the published state of one target from its output tree.
    pub fn load(target: Target, root: &Path, config: &Config) -> Self {
        let state = match target {
            Target::Altstore => load_altstore(root, &config.apps),
            Target::Fdroid => load_fdroid(root, &config.apps),
            Target::Homebrew => load_homebrew(root, &config.apps),
            Target::Winget => load_winget(root, config),
            Target::Aur => load_aur(root, &config.apps),
        };
        debug!(
            target = %target,
            apps = state.entries.len(),
            "recovered published state"
        );
        state
    }
}

/// Effective bundle identifier for a roster entry, mirroring the
/// fallback applied when records are normalized.
fn bundle_id(app: &AppEntry) -> String {
    app.bundle_identifier
        .clone()
        .unwrap_or_else(|| format!("ink.openlyst.{}", app.slug.to_lowercase()))
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    let raw = std::fs::read(path).ok()?;
    serde_json::from_slice(&raw).ok()
}

fn load_altstore(root: &Path, roster: &[AppEntry]) -> ManifestState {
    let mut state = ManifestState::empty();
    let Some(json) = read_json(&root.join("apps.json")) else {
        return state;
    };
    let Some(apps) = json["apps"].as_array() else {
        return state;
    };

    for entry in roster {
        let id = bundle_id(entry);
        let Some(app) = apps
            .iter()
            .find(|a| a["bundleIdentifier"].as_str() == Some(id.as_str()))
        else {
            continue;
        };
        let Some(version) = app["versions"][0]["version"].as_str() else {
            continue;
        };
        let mut digests = BTreeSet::new();
        if let Some(sha) = app["versions"][0]["sha256"].as_str() {
            if let Ok(digest) = Sha256Digest::new(sha) {
                digests.insert(digest);
            }
        }
        state.entries.insert(
            AppSlug::new(&entry.slug),
            StateEntry {
                version: Version::new(version),
                digests,
                version_code: None,
            },
        );
    }
    state
}

fn load_fdroid(root: &Path, roster: &[AppEntry]) -> ManifestState {
    let mut state = ManifestState::empty();
    let Some(json) = read_json(&root.join("index-v1.json")) else {
        return state;
    };

    for entry in roster {
        let id = bundle_id(entry);
        let Some(package) = json["packages"][&id][0].as_object() else {
            continue;
        };
        let Some(version) = package.get("versionName").and_then(|v| v.as_str()) else {
            continue;
        };
        let mut digests = BTreeSet::new();
        if let Some(sha) = package.get("hash").and_then(|v| v.as_str()) {
            if let Ok(digest) = Sha256Digest::new(sha) {
                digests.insert(digest);
            }
        }
        state.entries.insert(
            AppSlug::new(&entry.slug),
            StateEntry {
                version: Version::new(version),
                digests,
                version_code: package.get("versionCode").and_then(serde_json::Value::as_i64),
            },
        );

        // Keep the raw entry around so a regressing app can be
        // republished as-is. Best effort: an unparsable entry just
        // yields no carryover.
        let app_json = json["apps"]
            .as_array()
            .and_then(|apps| {
                apps.iter()
                    .find(|a| a["packageName"].as_str() == Some(id.as_str()))
            })
            .cloned();
        if let Some(app_json) = app_json {
            if let (Ok(app), Ok(packages)) = (
                serde_json::from_value::<fdroid::AppJson>(app_json),
                serde_json::from_value::<Vec<fdroid::PackageJson>>(json["packages"][&id].clone()),
            ) {
                state
                    .fdroid_carryover
                    .insert(AppSlug::new(&entry.slug), FdroidCarryover { app, packages });
            }
        }
    }
    state
}

fn load_homebrew(root: &Path, roster: &[AppEntry]) -> ManifestState {
    let Ok(version_re) = Regex::new(r#"version "([^"]+)""#) else {
        return ManifestState::empty();
    };
    let Ok(sha_re) = Regex::new(r#"sha256 "([0-9a-f]{64})""#) else {
        return ManifestState::empty();
    };

    let mut state = ManifestState::empty();
    for entry in roster {
        let slug = entry.slug.to_lowercase();
        let mut version: Option<String> = None;
        let mut digests = BTreeSet::new();

        // A cask and a formula may both exist; they share the version
        // but carry platform-specific digests.
        for path in [
            root.join(format!("Casks/{slug}.rb")),
            root.join(format!("Formula/{slug}.rb")),
        ] {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            if version.is_none() {
                version = version_re
                    .captures(&content)
                    .map(|c| c[1].to_string());
            }
            if let Some(c) = sha_re.captures(&content) {
                if let Ok(digest) = Sha256Digest::new(&c[1]) {
                    digests.insert(digest);
                }
            }
        }

        if let Some(version) = version {
            state.entries.insert(
                AppSlug::new(&entry.slug),
                StateEntry {
                    version: Version::new(&version),
                    digests,
                    version_code: None,
                },
            );
        }
    }
    state
}

fn load_winget(root: &Path, config: &Config) -> ManifestState {
    let mut state = ManifestState::empty();
    for entry in &config.apps {
        let id = winget::package_identifier(&config.repo.winget_namespace, &entry.name);
        let Some(json) = read_json(&root.join(format!("packages/{id}.json"))) else {
            continue;
        };
        let version_data = &json["Data"]["Versions"][0];
        let Some(version) = version_data["PackageVersion"].as_str() else {
            continue;
        };
        let mut digests = BTreeSet::new();
        if let Some(installers) = version_data["Installers"].as_array() {
            for installer in installers {
                if let Some(sha) = installer["InstallerSha256"].as_str() {
                    // Stored uppercase in the manifest; the digest type
                    // normalizes back to lowercase.
                    if let Ok(digest) = Sha256Digest::new(sha) {
                        digests.insert(digest);
                    }
                }
            }
        }
        state.entries.insert(
            AppSlug::new(&entry.slug),
            StateEntry {
                version: Version::new(version),
                digests,
                version_code: None,
            },
        );
    }
    state
}

fn load_aur(root: &Path, roster: &[AppEntry]) -> ManifestState {
    let Ok(pkgver_re) = Regex::new(r"(?m)^pkgver=(\S+)") else {
        return ManifestState::empty();
    };
    let Ok(sha_re) = Regex::new(r"sha256sums=\('([0-9a-f]{64})'\)") else {
        return ManifestState::empty();
    };

    let mut state = ManifestState::empty();
    for entry in roster {
        let Some(aur) = &entry.aur else {
            continue;
        };
        let path = root.join(&aur.package_name).join("PKGBUILD");
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let Some(version) = pkgver_re.captures(&content).map(|c| c[1].to_string()) else {
            continue;
        };
        let mut digests = BTreeSet::new();
        if let Some(c) = sha_re.captures(&content) {
            if let Ok(digest) = Sha256Digest::new(&c[1]) {
                digests.insert(digest);
            }
        }
        state.entries.insert(
            AppSlug::new(&entry.slug),
            StateEntry {
                // pkgver had hyphens mapped to underscores on write;
                // map them back so it compares against catalog versions.
                version: Version::new(&version.replace('_', "-")),
                digests,
                version_code: None,
            },
        );
    }
    state
}
