//! Shared fixtures for renderer tests.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};

use syndic_schema::{
    AppRecord, AppSlug, Arch, DigestAlgorithm, DownloadKey, Platform, Sha256Digest,
    VerifiedDownload, Version,
};

use crate::config::{
    AppEntry, AurPackaging, CatalogConfig, Config, OutputConfig, RepoConfig,
};
use crate::plan::{self, CycleRecord, RenderPlan};
use crate::render::Target;
use crate::state::ManifestState;

/// A fixed config, an empty prior state and a pinned timestamp.
pub(crate) fn context_parts() -> (Config, ManifestState, DateTime<Utc>) {
    let config = Config {
        catalog: CatalogConfig {
            base_url: "https://openlyst.ink".to_string(),
            timeout_secs: 5,
            retries: 1,
            concurrency: 2,
            deadline_secs: 60,
        },
        repo: RepoConfig {
            name: "OpenLyst Apps".to_string(),
            subtitle: "Open media apps".to_string(),
            description: "Manifests for the OpenLyst catalog".to_string(),
            website: "https://openlyst.ink".to_string(),
            base_url: "https://repo.openlyst.ink".to_string(),
            tint_color: "#dc2626".to_string(),
            winget_namespace: "OpenLyst".to_string(),
            winget_base_url: "https://winget.openlyst.ink".to_string(),
            fdroid_address: "https://fdroid.openlyst.ink/fdroid/repo".to_string(),
            maintainer: "OpenLyst <contact@openlyst.ink>".to_string(),
        },
        output: OutputConfig::default(),
        digest_policy: crate::config::DigestPolicy::TrustComputed,
        apps: vec![
            roster_entry("docan", Some("docan-bin")),
            roster_entry("finar", Some("finar-bin")),
            roster_entry("plain", None),
        ],
    };
    let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
    (config, ManifestState::empty(), now)
}

fn roster_entry(slug: &str, aur_package: Option<&str>) -> AppEntry {
    AppEntry {
        slug: slug.to_string(),
        name: slug.to_string(),
        description: format!("The {slug} application"),
        license: "GPL3".to_string(),
        homepage: format!("https://gitlab.com/Openlyst/{slug}"),
        subtitle: None,
        bundle_identifier: None,
        category: None,
        aur: aur_package.map(|name| AurPackaging {
            package_name: name.to_string(),
            depends: vec!["gtk3".to_string()],
            conflicts: vec![slug.to_string()],
            provides: vec![slug.to_string()],
        }),
    }
}

/// One app with a single download for the given platform, digest and
/// length derived deterministically from the URL.
pub(crate) fn cycle_record(
    slug: &str,
    version: &str,
    platform: Platform,
    ext: &str,
) -> CycleRecord {
    let key = DownloadKey::new(platform, Arch::X86_64);
    let url = format!(
        "https://cdn.openlyst.ink/{slug}/{slug}-{version}-{platform}.{ext}",
        platform = platform.as_str().to_lowercase()
    );
    let digest = Sha256Digest::compute(url.as_bytes());

    let mut urls = BTreeMap::new();
    urls.insert(key, url.clone());
    let mut downloads = BTreeMap::new();
    downloads.insert(
        key,
        VerifiedDownload {
            url,
            length: 1024 + slug.len() as u64,
            digest,
            algorithm: DigestAlgorithm::Sha256,
        },
    );

    CycleRecord {
        record: AppRecord {
            slug: AppSlug::new(slug),
            name: slug.to_string(),
            description: format!("The {slug} application"),
            license: "GPL3".to_string(),
            homepage: format!("https://gitlab.com/Openlyst/{slug}"),
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

/// Plan all records as new against an empty prior state.
pub(crate) fn plan_of<'a>(target: Target, records: &'a [CycleRecord]) -> RenderPlan<'a> {
    plan::plan(target, records, &ManifestState::empty(), false)
}
