//! AltStore JSON feed renderer.
//!
//! Produces a single `apps.json` document (repository header plus a
//! sorted `apps` array) and a small `index.json` pointer file. Each
//! app entry embeds the current version, download URL, byte size and
//! hex digest; permissions and screenshots are emitted only when
//! declared.

use serde::Serialize;

use syndic_schema::Platform;

use crate::plan::{PlanEntry, RenderPlan};

use super::{RenderContext, RenderError, RenderOutcome, TargetOutput};

/// Categories AltStore clients understand; anything else maps to
/// `other`.
const VALID_CATEGORIES: &[&str] = &[
    "developer",
    "entertainment",
    "games",
    "lifestyle",
    "other",
    "photo-video",
    "social",
    "utilities",
];

/// Preferred platform order when picking the download an AltStore
/// entry links to.
const PLATFORM_PREFERENCE: &[Platform] = &[
    Platform::Ios,
    Platform::Macos,
    Platform::Linux,
    Platform::Windows,
    Platform::Android,
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Repository<'a> {
    name: &'a str,
    subtitle: &'a str,
    description: &'a str,
    #[serde(rename = "iconURL")]
    icon_url: String,
    #[serde(rename = "headerURL")]
    header_url: String,
    website: &'a str,
    tint_color: &'a str,
    featured_apps: Vec<String>,
    apps: Vec<AppJson>,
    news: Vec<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppJson {
    name: String,
    bundle_identifier: String,
    developer_name: String,
    subtitle: String,
    localized_description: String,
    #[serde(rename = "iconURL")]
    icon_url: String,
    tint_color: String,
    category: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    screenshots: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    app_permissions: Vec<String>,
    versions: Vec<VersionJson>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionJson {
    version: String,
    date: String,
    #[serde(rename = "downloadURL")]
    download_url: String,
    size: u64,
    sha256: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Index<'a> {
    #[serde(rename = "repositoryURL")]
    repository_url: String,
    name: &'a str,
    subtitle: &'a str,
    description: &'a str,
    generated_at: String,
}

pub(super) fn render(
    plan: &RenderPlan<'_>,
    ctx: &RenderContext<'_>,
) -> Result<RenderOutcome, RenderError> {
    let repo = &ctx.config.repo;
    let base = repo.base_url.trim_end_matches('/');
    let date = ctx.generated_at.to_rfc3339();

    let apps: Vec<AppJson> = plan
        .entries
        .iter()
        .filter_map(|entry| app_json(entry, ctx, &date))
        .collect();

    let featured_apps = apps
        .iter()
        .take(5)
        .map(|a| a.bundle_identifier.clone())
        .collect();

    let repository = Repository {
        name: &repo.name,
        subtitle: &repo.subtitle,
        description: &repo.description,
        icon_url: format!("{base}/icon.png"),
        header_url: format!("{base}/header.png"),
        website: &repo.website,
        tint_color: &repo.tint_color,
        featured_apps,
        apps,
        news: Vec::new(),
    };

    let index = Index {
        repository_url: format!("{base}/apps.json"),
        name: &repo.name,
        subtitle: &repo.subtitle,
        description: &repo.description,
        generated_at: date,
    };

    let rendered = repository.apps.len();
    let mut output = TargetOutput::new(plan.target);
    output.add("apps.json", serde_json::to_vec_pretty(&repository)?);
    output.add("index.json", serde_json::to_vec_pretty(&index)?);

    Ok(RenderOutcome {
        output,
        skipped: Vec::new(),
        rendered,
    })
}

fn app_json(entry: &PlanEntry<'_>, ctx: &RenderContext<'_>, date: &str) -> Option<AppJson> {
    let record = &entry.app.record;
    let key = PLATFORM_PREFERENCE
        .iter()
        .find_map(|p| record.any_download_for(*p).map(|(k, _)| k))?;
    let download = entry.app.downloads.get(&key)?;

    Some(AppJson {
        name: record.name.clone(),
        bundle_identifier: record.bundle_id(),
        developer_name: ctx.config.repo.name.clone(),
        subtitle: record
            .subtitle
            .clone()
            .unwrap_or_else(|| record.name.clone()),
        localized_description: record.description.clone(),
        icon_url: record.icon_url.clone().unwrap_or_default(),
        tint_color: record
            .tint_color
            .clone()
            .unwrap_or_else(|| ctx.config.repo.tint_color.clone()),
        category: map_category(record.category.as_deref()),
        screenshots: record.screenshots.iter().take(10).cloned().collect(),
        app_permissions: record.permissions.clone(),
        versions: vec![VersionJson {
            version: record.version.to_string(),
            date: date.to_string(),
            download_url: download.url.clone(),
            size: download.length,
            sha256: download.digest.to_string(),
        }],
    })
}

/// Map a free-form category onto the AltStore category set.
fn map_category(category: Option<&str>) -> String {
    let normalized = category
        .unwrap_or("other")
        .to_lowercase()
        .replace(' ', "-");
    if VALID_CATEGORIES.contains(&normalized.as_str()) {
        normalized
    } else {
        "other".to_string()
    }
}
