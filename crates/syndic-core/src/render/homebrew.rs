//! Homebrew tap renderer.
//!
//! One `.rb` file per app: `Casks/{slug}.rb` from the macOS artifact
//! and `Formula/{slug}.rb` from the Linux one, gated by the requested
//! platform selection. Apps that lack an artifact for a requested
//! platform simply produce no file there.

use syndic_schema::Platform;

use crate::plan::{PlanEntry, RenderPlan};

use super::{RenderContext, RenderError, RenderOutcome, TargetOutput};

pub(super) fn render(
    plan: &RenderPlan<'_>,
    ctx: &RenderContext<'_>,
) -> Result<RenderOutcome, RenderError> {
    let mut output = TargetOutput::new(plan.target);
    let mut rendered = 0;

    for entry in &plan.entries {
        let slug = entry.app.record.slug.as_str();
        let mut emitted = false;

        if ctx.platform.includes_macos() {
            if let Some(cask) = cask(entry) {
                output.add(format!("Casks/{slug}.rb"), cask);
                emitted = true;
            }
        }
        if ctx.platform.includes_linux() {
            if let Some(formula) = formula(entry) {
                output.add(format!("Formula/{slug}.rb"), formula);
                emitted = true;
            }
        }
        if emitted {
            rendered += 1;
        }
    }

    Ok(RenderOutcome {
        output,
        skipped: Vec::new(),
        rendered,
    })
}

fn cask(entry: &PlanEntry<'_>) -> Option<String> {
    let record = &entry.app.record;
    let (key, _) = record.any_download_for(Platform::Macos)?;
    let download = entry.app.downloads.get(&key)?;

    Some(format!(
        r#"cask "{slug}" do
  version "{version}"
  sha256 "{sha256}"

  url "{url}"
  name "{name}"
  desc "{desc}"
  homepage "{homepage}"

  app "{app_name}.app"
end
"#,
        slug = record.slug,
        version = record.version,
        sha256 = download.digest,
        url = download.url,
        name = record.name,
        desc = ruby_escape(&record.description),
        homepage = record.homepage,
        app_name = record.name,
    ))
}

fn formula(entry: &PlanEntry<'_>) -> Option<String> {
    let record = &entry.app.record;
    let (key, _) = record.any_download_for(Platform::Linux)?;
    let download = entry.app.downloads.get(&key)?;

    // Wider raw-string delimiter: the test stanza contains `"#`.
    Some(format!(
        r##"class {class} < Formula
  desc "{desc}"
  homepage "{homepage}"
  url "{url}"
  sha256 "{sha256}"
  version "{version}"
  license "{license}"

  def install
    bin.install "{slug}"
  end

  test do
    system "#{{bin}}/{slug}", "--version"
  end
end
"##,
        class = class_name(record.slug.as_str()),
        desc = ruby_escape(&record.description),
        homepage = record.homepage,
        url = download.url,
        sha256 = download.digest,
        version = record.version,
        license = spdx_license(&record.license),
        slug = record.slug,
    ))
}

/// Ruby class name for a slug: `media-hub` becomes `MediaHub`.
fn class_name(slug: &str) -> String {
    slug.split(['-', '_'])
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Map the catalog's shorthand license strings onto SPDX identifiers
/// Homebrew's audit accepts; unknown strings pass through unchanged.
fn spdx_license(license: &str) -> String {
    match license {
        "GPL3" | "GPLv3" => "GPL-3.0-only".to_string(),
        "GPL2" | "GPLv2" => "GPL-2.0-only".to_string(),
        "AGPL3" | "AGPLv3" => "AGPL-3.0-only".to_string(),
        "LGPL3" | "LGPLv3" => "LGPL-3.0-only".to_string(),
        "Apache2" | "Apache-2" => "Apache-2.0".to_string(),
        other => other.to_string(),
    }
}

fn ruby_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
