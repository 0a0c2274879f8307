//! Winget REST source renderer.
//!
//! Produces the document set a static Winget REST source serves:
//! `information.json` (source metadata), `packageManifests.json` (the
//! search endpoint), `packages.json` (identifier index), one
//! `packages/{id}.json` per app with locale and installer data, and a
//! `source-info.json` summary for humans. Only apps with a Windows
//! artifact appear; the installer digest is emitted uppercase, as
//! winget expects.

use serde::Serialize;

use syndic_schema::Platform;

use crate::plan::{PlanEntry, RenderPlan};

use super::{RenderContext, RenderError, RenderOutcome, TargetOutput};

/// REST schema versions this document set conforms to.
const SUPPORTED_VERSIONS: &[&str] = &["1.4.0", "1.5.0"];

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Information<'a> {
    data: InformationData<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InformationData<'a> {
    source_identifier: String,
    server_supported_versions: &'a [&'a str],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PackageIndex {
    data: Vec<PackageRef>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PackageRef {
    package_identifier: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchIndex {
    data: Vec<SearchEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchEntry {
    package_identifier: String,
    package_name: String,
    publisher: String,
    versions: Vec<String>,
}

/// Human-facing summary next to the REST documents, snake_case keys.
#[derive(Serialize)]
struct SourceInfo {
    name: String,
    description: String,
    homepage: String,
    generated_at: String,
    base_url: String,
    package_count: usize,
    usage: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Manifest {
    data: ManifestData,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestData {
    package_identifier: String,
    versions: Vec<VersionData>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VersionData {
    package_version: String,
    default_locale: Locale,
    installers: Vec<Installer>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Locale {
    package_locale: &'static str,
    publisher: String,
    package_name: String,
    package_url: String,
    license: String,
    short_description: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Installer {
    architecture: &'static str,
    installer_type: &'static str,
    installer_url: String,
    installer_sha256: String,
}

pub(super) fn render(
    plan: &RenderPlan<'_>,
    ctx: &RenderContext<'_>,
) -> Result<RenderOutcome, RenderError> {
    let repo = &ctx.config.repo;
    let namespace = &repo.winget_namespace;
    let mut output = TargetOutput::new(plan.target);
    let mut index = Vec::new();
    let mut search = Vec::new();

    for entry in &plan.entries {
        let Some(manifest) = manifest(entry, ctx) else {
            continue;
        };
        let id = manifest.data.package_identifier.clone();
        index.push(PackageRef {
            package_identifier: id.clone(),
        });
        search.push(SearchEntry {
            package_identifier: id.clone(),
            package_name: entry.app.record.name.clone(),
            publisher: repo.name.clone(),
            versions: manifest
                .data
                .versions
                .iter()
                .map(|v| v.package_version.clone())
                .collect(),
        });
        output.add(format!("packages/{id}.json"), serde_json::to_vec_pretty(&manifest)?);
    }

    let rendered = index.len();
    let information = Information {
        data: InformationData {
            source_identifier: format!("{namespace}.Source"),
            server_supported_versions: SUPPORTED_VERSIONS,
        },
    };
    output.add("information.json", serde_json::to_vec_pretty(&information)?);
    output.add(
        "packageManifests.json",
        serde_json::to_vec_pretty(&SearchIndex { data: search })?,
    );
    output.add(
        "packages.json",
        serde_json::to_vec_pretty(&PackageIndex { data: index })?,
    );
    output.add(
        "source-info.json",
        serde_json::to_vec_pretty(&SourceInfo {
            name: format!("{} Winget REST Source", repo.name),
            description: repo.description.clone(),
            homepage: repo.website.clone(),
            generated_at: ctx.generated_at.to_rfc3339(),
            base_url: repo.winget_base_url.clone(),
            package_count: rendered,
            usage: format!(
                "winget source add {} {}",
                namespace.to_lowercase(),
                repo.winget_base_url
            ),
        })?,
    );

    Ok(RenderOutcome {
        output,
        skipped: Vec::new(),
        rendered,
    })
}

fn manifest(entry: &PlanEntry<'_>, ctx: &RenderContext<'_>) -> Option<Manifest> {
    let record = &entry.app.record;
    let installers: Vec<Installer> = record
        .downloads
        .keys()
        .filter(|key| key.platform == Platform::Windows)
        .filter_map(|key| {
            let download = entry.app.downloads.get(key)?;
            Some(Installer {
                architecture: key.arch.winget_name(),
                installer_type: installer_type(&download.url),
                installer_url: download.url.clone(),
                installer_sha256: download.digest.to_uppercase_hex(),
            })
        })
        .collect();
    if installers.is_empty() {
        return None;
    }

    let identifier = package_identifier(&ctx.config.repo.winget_namespace, &record.name);
    Some(Manifest {
        data: ManifestData {
            package_identifier: identifier,
            versions: vec![VersionData {
                package_version: record.version.to_string(),
                default_locale: Locale {
                    package_locale: "en-US",
                    publisher: ctx.config.repo.name.clone(),
                    package_name: record.name.clone(),
                    package_url: record.homepage.clone(),
                    license: record.license.clone(),
                    short_description: record.description.clone(),
                },
                installers,
            }],
        },
    })
}

/// Winget package identifier: `{namespace}.{Name}` with the name
/// title-cased and stripped of anything non-alphanumeric.
pub(crate) fn package_identifier(namespace: &str, name: &str) -> String {
    let cleaned: String = name
        .split([' ', '-', '_'])
        .map(|part| {
            let mut chars = part.chars().filter(char::is_ascii_alphanumeric);
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    format!("{namespace}.{cleaned}")
}

/// Installer type from the artifact's file extension.
fn installer_type(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.ends_with(".msix") {
        "msix"
    } else if lower.ends_with(".msi") {
        "msi"
    } else if lower.ends_with(".zip") {
        "zip"
    } else {
        "exe"
    }
}
