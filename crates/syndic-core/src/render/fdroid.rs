//! F-Droid repository index renderer.
//!
//! Emits a single `index-v1.json` with the repo header, one app entry
//! per record and a packages map keyed by package name. F-Droid clients
//! compare integer version codes, so one is derived from the version
//! string; a derived code lower than the previously published one is a
//! per-app error (clients would refuse the downgrade). The regressing
//! version is never published - the previously published entry is
//! carried forward unchanged so the app does not vanish from the index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use syndic_schema::Platform;

use crate::plan::{PlanEntry, RenderPlan};

use super::{RenderContext, RenderError, RenderOutcome, TargetOutput};

/// Upper bound per version component when deriving a version code, so
/// `major * 1_000_000 + minor * 1_000 + patch` stays collision-free.
const COMPONENT_CAP: i64 = 999;

#[derive(Serialize)]
struct Index<'a> {
    repo: Repo<'a>,
    apps: Vec<AppJson>,
    packages: BTreeMap<String, Vec<PackageJson>>,
}

#[derive(Serialize)]
struct Repo<'a> {
    name: &'a str,
    description: &'a str,
    address: &'a str,
    icon: &'static str,
    version: u32,
    timestamp: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AppJson {
    pub(crate) package_name: String,
    pub(crate) name: String,
    pub(crate) summary: String,
    pub(crate) description: String,
    pub(crate) license: String,
    pub(crate) web_site: String,
    pub(crate) suggested_version_name: String,
    pub(crate) suggested_version_code: String,
    pub(crate) added: i64,
    pub(crate) last_updated: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PackageJson {
    pub(crate) apk_name: String,
    pub(crate) hash: String,
    pub(crate) hash_type: String,
    pub(crate) package_name: String,
    pub(crate) size: u64,
    pub(crate) version_code: i64,
    pub(crate) version_name: String,
    pub(crate) added: i64,
}

pub(super) fn render(
    plan: &RenderPlan<'_>,
    ctx: &RenderContext<'_>,
) -> Result<RenderOutcome, RenderError> {
    let timestamp = ctx.generated_at.timestamp_millis();
    let mut apps = Vec::new();
    let mut packages = BTreeMap::new();
    let mut skipped = Vec::new();

    for entry in &plan.entries {
        let record = &entry.app.record;
        let derived = version_code(record.version.as_str());

        if let Some(prior) = ctx.previous.entries.get(&record.slug) {
            if let Some(previous) = prior.version_code {
                if derived < previous {
                    warn!(
                        slug = %record.slug,
                        previous,
                        derived,
                        "version code regression, keeping the published entry"
                    );
                    skipped.push((
                        record.slug.clone(),
                        RenderError::VersionCodeRegression {
                            slug: record.slug.clone(),
                            previous,
                            derived,
                        },
                    ));
                    // Republish the prior entry verbatim instead of
                    // erasing the app from the index.
                    if let Some(carried) = ctx.previous.fdroid_carryover.get(&record.slug) {
                        packages.insert(
                            carried.app.package_name.clone(),
                            carried.packages.clone(),
                        );
                        apps.push(carried.app.clone());
                    }
                    continue;
                }
            }
        }

        let Some((app, package)) = app_json(entry, derived, timestamp) else {
            continue;
        };
        packages.insert(app.package_name.clone(), vec![package]);
        apps.push(app);
    }

    let index = Index {
        repo: Repo {
            name: &ctx.config.repo.name,
            description: &ctx.config.repo.description,
            address: &ctx.config.repo.fdroid_address,
            icon: "icon.png",
            version: 21,
            timestamp,
        },
        apps,
        packages,
    };

    let rendered = index.apps.len();
    let mut output = TargetOutput::new(plan.target);
    output.add("index-v1.json", serde_json::to_vec_pretty(&index)?);

    Ok(RenderOutcome {
        output,
        skipped,
        rendered,
    })
}

fn app_json(
    entry: &PlanEntry<'_>,
    version_code: i64,
    timestamp: i64,
) -> Option<(AppJson, PackageJson)> {
    let record = &entry.app.record;
    // Android artifacts when present, otherwise Linux ones: the index
    // also feeds desktop F-Droid clients.
    let key = record
        .any_download_for(Platform::Android)
        .or_else(|| record.any_download_for(Platform::Linux))
        .map(|(k, _)| k)?;
    let download = entry.app.downloads.get(&key)?;

    let package_name = record.bundle_id();
    let apk_name = download
        .url
        .rsplit('/')
        .next()
        .unwrap_or(download.url.as_str())
        .to_string();

    let app = AppJson {
        package_name: package_name.clone(),
        name: record.name.clone(),
        summary: record
            .subtitle
            .clone()
            .unwrap_or_else(|| record.name.clone()),
        description: record.description.clone(),
        license: record.license.clone(),
        web_site: record.homepage.clone(),
        suggested_version_name: record.version.to_string(),
        suggested_version_code: version_code.to_string(),
        added: timestamp,
        last_updated: timestamp,
    };
    let package = PackageJson {
        apk_name,
        hash: download.digest.to_string(),
        hash_type: "sha256".to_string(),
        package_name,
        size: download.length,
        version_code,
        version_name: record.version.to_string(),
        added: timestamp,
    };
    Some((app, package))
}

/// Derive a monotonic integer version code from a version string:
/// `major * 1_000_000 + minor * 1_000 + patch`, each component clamped
/// to three digits. Non-numeric suffixes are ignored (`2.3.1-beta`
/// codes the same as `2.3.1`).
pub(crate) fn version_code(version: &str) -> i64 {
    let mut components = [0i64; 3];
    for (i, part) in version.split('.').take(3).enumerate() {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        components[i] = digits.parse::<i64>().unwrap_or(0).min(COMPONENT_CAP);
    }
    components[0] * 1_000_000 + components[1] * 1_000 + components[2]
}
