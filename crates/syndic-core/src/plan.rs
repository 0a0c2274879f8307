//! Change detection.
//!
//! Compares the freshly fetched cycle records against the previously
//! published snapshot of one target and tags every app with the reason
//! it needs (or does not need) regeneration. Plans are ordered by slug
//! so rendered output stays deterministic and diffable across runs.

use std::collections::BTreeMap;

use serde::Serialize;

use syndic_schema::{AppRecord, DownloadKey, VerifiedDownload};

use crate::render::Target;
use crate::state::ManifestState;

/// Why an app appears in a render plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanReason {
    /// Not present in the previous snapshot.
    New,
    /// Version string differs from the previously published one.
    VersionChanged,
    /// Same version, but a previously published digest is no longer
    /// among the verified ones - upstream republished the bytes.
    HashMismatch,
    /// `--force` was set.
    Forced,
    /// Nothing changed; carried through so aggregate outputs stay
    /// complete, and so per-file targets keep their files alive.
    Unchanged,
}

impl std::fmt::Display for PlanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::VersionChanged => "version-changed",
            Self::HashMismatch => "hash-mismatch",
            Self::Forced => "forced",
            Self::Unchanged => "unchanged",
        };
        write!(f, "{s}")
    }
}

/// One app's fetched record plus its verified downloads for the cycle.
#[derive(Debug, Clone)]
pub struct CycleRecord {
    /// Normalized catalog record.
    pub record: AppRecord,
    /// Digest per declared download, produced by the verifier.
    pub downloads: BTreeMap<DownloadKey, VerifiedDownload>,
}

/// A plan entry: one app and the reason it is in the plan.
#[derive(Debug, Clone, Copy)]
pub struct PlanEntry<'a> {
    /// The app's cycle data.
    pub app: &'a CycleRecord,
    /// Why this entry is being (re)rendered.
    pub reason: PlanReason,
}

/// The filtered, ordered set of app entries a renderer must produce.
#[derive(Debug)]
pub struct RenderPlan<'a> {
    /// Target this plan was computed for.
    pub target: Target,
    /// Entries in ascending slug order.
    pub entries: Vec<PlanEntry<'a>>,
    /// Previously published apps no longer present in the current set;
    /// publishing prunes their files.
    pub stale: usize,
}

impl RenderPlan<'_> {
    /// True when nothing changed and the target can be skipped
    /// entirely, leaving the published tree untouched. A stale app
    /// still needing removal keeps the plan live.
    pub fn is_noop(&self) -> bool {
        !self.entries.is_empty()
            && self.stale == 0
            && self
                .entries
                .iter()
                .all(|e| e.reason == PlanReason::Unchanged)
    }

    /// Number of entries that actually changed this cycle.
    pub fn changed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.reason != PlanReason::Unchanged)
            .count()
    }
}

/// Compute the render plan for one target.
///
/// Every live record appears in the plan (the publisher deletes files
/// absent from a target's output set, so dropping unchanged apps from
/// the plan would delete their manifests). Removal is therefore
/// implicit: apps present in `previous` but absent from `current`
/// simply produce no output and their files are pruned on publish.
pub fn plan<'a>(
    target: Target,
    current: &'a [CycleRecord],
    previous: &ManifestState,
    force: bool,
) -> RenderPlan<'a> {
    let mut entries: Vec<PlanEntry<'a>> = current
        .iter()
        .map(|cycle| PlanEntry {
            app: cycle,
            reason: classify(cycle, previous, force),
        })
        .collect();
    entries.sort_by(|a, b| a.app.record.slug.cmp(&b.app.record.slug));
    let stale = previous
        .entries
        .keys()
        .filter(|slug| !current.iter().any(|c| &c.record.slug == *slug))
        .count();
    RenderPlan {
        target,
        entries,
        stale,
    }
}

fn classify(cycle: &CycleRecord, previous: &ManifestState, force: bool) -> PlanReason {
    let Some(prior) = previous.entries.get(&cycle.record.slug) else {
        return PlanReason::New;
    };
    if prior.version != cycle.record.version {
        return PlanReason::VersionChanged;
    }
    // Targets embed different digest subsets, so compare by set
    // containment: a previously published digest that vanished from
    // the verified set means the same version was republished with
    // different bytes. With no fresh digests at all (metadata-only
    // planning) there is nothing to compare.
    if !prior.digests.is_empty() {
        let fresh: std::collections::BTreeSet<_> =
            cycle.downloads.values().map(|d| d.digest.clone()).collect();
        if !fresh.is_empty() && !prior.digests.iter().all(|d| fresh.contains(d)) {
            return PlanReason::HashMismatch;
        }
    }
    if force {
        return PlanReason::Forced;
    }
    PlanReason::Unchanged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateEntry;
    use std::collections::{BTreeMap, BTreeSet};
    use syndic_schema::{
        AppSlug, Arch, DigestAlgorithm, Platform, Sha256Digest, Version,
    };

    fn cycle(slug: &str, version: &str, digest_seed: u8) -> CycleRecord {
        let key = DownloadKey::new(Platform::Linux, Arch::X86_64);
        let url = format!("https://cdn.example.com/{slug}-{version}.zip");
        let digest = Sha256Digest::new(format!("{digest_seed:02x}").repeat(32)).unwrap();
        let mut downloads = BTreeMap::new();
        downloads.insert(
            key,
            VerifiedDownload {
                url: url.clone(),
                length: 42,
                digest,
                algorithm: DigestAlgorithm::Sha256,
            },
        );
        let mut urls = BTreeMap::new();
        urls.insert(key, url);
        CycleRecord {
            record: AppRecord {
                slug: AppSlug::new(slug),
                name: slug.to_string(),
                description: "desc".to_string(),
                license: "GPL3".to_string(),
                homepage: "https://example.com".to_string(),
                version: Version::new(version),
                downloads: urls,
                declared_digests: BTreeMap::new(),
                subtitle: None,
                bundle_identifier: None,
                icon_url: None,
                tint_color: None,
                category: None,
                screenshots: Vec::new(),
                permissions: Vec::new(),
            },
            downloads,
        }
    }

    fn state_with(slug: &str, version: &str, digest_seed: Option<u8>) -> ManifestState {
        let mut digests = BTreeSet::new();
        if let Some(seed) = digest_seed {
            digests.insert(Sha256Digest::new(format!("{seed:02x}").repeat(32)).unwrap());
        }
        let mut entries = BTreeMap::new();
        entries.insert(
            AppSlug::new(slug),
            StateEntry {
                version: Version::new(version),
                digests,
                version_code: None,
            },
        );
        let mut state = ManifestState::empty();
        state.entries = entries;
        state
    }

    #[test]
    fn absent_from_previous_is_new() {
        let current = vec![cycle("docan", "1.0.0", 0xaa)];
        let p = plan(Target::Altstore, &current, &ManifestState::empty(), false);
        assert_eq!(p.entries[0].reason, PlanReason::New);
    }

    #[test]
    fn version_difference_wins() {
        let current = vec![cycle("docan", "1.1.0", 0xaa)];
        let p = plan(
            Target::Altstore,
            &current,
            &state_with("docan", "1.0.0", Some(0xaa)),
            false,
        );
        assert_eq!(p.entries[0].reason, PlanReason::VersionChanged);
    }

    #[test]
    fn same_version_different_bytes_is_hash_mismatch() {
        let current = vec![cycle("docan", "1.0.0", 0xbb)];
        let p = plan(
            Target::Altstore,
            &current,
            &state_with("docan", "1.0.0", Some(0xaa)),
            false,
        );
        assert_eq!(p.entries[0].reason, PlanReason::HashMismatch);
    }

    #[test]
    fn unchanged_without_force() {
        let current = vec![cycle("docan", "1.0.0", 0xaa)];
        let p = plan(
            Target::Altstore,
            &current,
            &state_with("docan", "1.0.0", Some(0xaa)),
            false,
        );
        assert_eq!(p.entries[0].reason, PlanReason::Unchanged);
        assert!(p.is_noop());
        assert_eq!(p.changed(), 0);
    }

    #[test]
    fn force_upgrades_unchanged_only() {
        let current = vec![cycle("docan", "1.0.0", 0xaa), cycle("finar", "2.0.0", 0xcc)];
        let p = plan(
            Target::Altstore,
            &current,
            &state_with("docan", "1.0.0", Some(0xaa)),
            true,
        );
        assert_eq!(p.entries[0].reason, PlanReason::Forced);
        assert_eq!(p.entries[1].reason, PlanReason::New);
        assert!(!p.is_noop());
    }

    #[test]
    fn entries_sorted_by_slug() {
        let current = vec![cycle("zeta", "1.0.0", 1), cycle("alpha", "1.0.0", 2)];
        let p = plan(Target::Altstore, &current, &ManifestState::empty(), false);
        assert_eq!(p.entries[0].app.record.slug, "alpha");
        assert_eq!(p.entries[1].app.record.slug, "zeta");
    }

    #[test]
    fn removed_app_keeps_plan_live() {
        let current = vec![cycle("docan", "1.0.0", 0xaa)];
        let mut previous = state_with("docan", "1.0.0", Some(0xaa));
        previous.entries.insert(
            AppSlug::new("gone"),
            StateEntry {
                version: Version::new("0.1.0"),
                digests: BTreeSet::new(),
                version_code: None,
            },
        );

        let p = plan(Target::Altstore, &current, &previous, false);
        assert_eq!(p.entries[0].reason, PlanReason::Unchanged);
        assert_eq!(p.stale, 1);
        // The stale app must be pruned, so this is not a noop.
        assert!(!p.is_noop());
    }

    #[test]
    fn missing_fresh_digests_never_flag_a_mismatch() {
        let mut current = vec![cycle("docan", "1.0.0", 0xbb)];
        current[0].downloads.clear();
        let p = plan(
            Target::Altstore,
            &current,
            &state_with("docan", "1.0.0", Some(0xaa)),
            false,
        );
        assert_eq!(p.entries[0].reason, PlanReason::Unchanged);
    }

    #[test]
    fn state_without_digests_compares_versions_only() {
        let current = vec![cycle("docan", "1.0.0", 0xbb)];
        let p = plan(
            Target::Altstore,
            &current,
            &state_with("docan", "1.0.0", None),
            false,
        );
        assert_eq!(p.entries[0].reason, PlanReason::Unchanged);
    }
}
