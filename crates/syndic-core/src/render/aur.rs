//! AUR package renderer.
//!
//! For every roster app with an `[apps.aur]` block and a Linux x86_64
//! artifact, emits `{package_name}/PKGBUILD` and
//! `{package_name}/.SRCINFO`. Both files are projected from one
//! [`AurRender`] value so their version, digest and dependency fields
//! can never drift apart.

use syndic_schema::{Arch, Platform};

use crate::config::AurPackaging;
use crate::plan::{PlanEntry, RenderPlan};

use super::{RenderContext, RenderError, RenderOutcome, TargetOutput};

/// The fields both generated files are built from.
struct AurRender<'a> {
    packaging: &'a AurPackaging,
    maintainer: &'a str,
    /// Binary name: the package name with a trailing `-bin` stripped.
    app_name: String,
    pkgver: String,
    pkgdesc: String,
    url: String,
    license: String,
    source_name: String,
    source_url: String,
    sha256: String,
}

impl AurRender<'_> {
    fn pkgbuild(&self) -> String {
        let mut out = String::new();
        if !self.maintainer.is_empty() {
            out.push_str(&format!("# Maintainer: {}\n", self.maintainer));
        }
        out.push_str(&format!(
            "pkgname={name}\n\
             pkgver={pkgver}\n\
             pkgrel=1\n\
             pkgdesc=\"{pkgdesc}\"\n\
             arch=('x86_64')\n\
             url=\"{url}\"\n\
             license=('{license}')\n",
            name = self.packaging.package_name,
            pkgver = self.pkgver,
            pkgdesc = self.pkgdesc,
            url = self.url,
            license = self.license,
        ));
        out.push_str(&bash_array("depends", &self.packaging.depends));
        out.push_str(&bash_array("provides", &self.packaging.provides));
        out.push_str(&bash_array("conflicts", &self.packaging.conflicts));
        out.push_str(&format!(
            "source=(\"{name}::{url}\")\n\
             sha256sums=('{sha256}')\n\
             \n\
             {package_fn}",
            name = self.source_name,
            url = self.source_url,
            sha256 = self.sha256,
            package_fn = self.package_fn(),
        ));
        out
    }

    fn srcinfo(&self) -> String {
        let mut out = format!("pkgbase = {}\n", self.packaging.package_name);
        let mut field = |key: &str, value: &str| {
            out.push_str(&format!("\t{key} = {value}\n"));
        };
        field("pkgdesc", &self.pkgdesc);
        field("pkgver", &self.pkgver);
        field("pkgrel", "1");
        field("url", &self.url);
        field("arch", "x86_64");
        field("license", &self.license);
        for dep in &self.packaging.depends {
            field("depends", dep);
        }
        for p in &self.packaging.provides {
            field("provides", p);
        }
        for c in &self.packaging.conflicts {
            field("conflicts", c);
        }
        field("source", &format!("{}::{}", self.source_name, self.source_url));
        field("sha256sums", &self.sha256);
        out.push_str(&format!("\npkgname = {}\n", self.packaging.package_name));
        out
    }

    /// `package()` body, shaped by the artifact kind: AppImages are
    /// installed under /opt with a launcher symlink, archives and bare
    /// binaries land in /usr/bin.
    fn package_fn(&self) -> String {
        let app = &self.app_name;
        let source = &self.source_name;
        if self.source_name.to_lowercase().ends_with(".appimage") {
            format!(
                "package() {{\n  \
                   install -Dm755 \"$srcdir/{source}\" \"$pkgdir/opt/{app}/{app}.AppImage\"\n  \
                   install -dm755 \"$pkgdir/usr/bin\"\n  \
                   ln -s \"/opt/{app}/{app}.AppImage\" \"$pkgdir/usr/bin/{app}\"\n\
                 }}\n"
            )
        } else if self.source_name.to_lowercase().ends_with(".zip")
            || self.source_name.to_lowercase().ends_with(".tar.gz")
        {
            format!(
                "package() {{\n  \
                   install -Dm755 \"$srcdir/{app}\" \"$pkgdir/usr/bin/{app}\"\n\
                 }}\n"
            )
        } else {
            format!(
                "package() {{\n  \
                   install -Dm755 \"$srcdir/{source}\" \"$pkgdir/usr/bin/{app}\"\n\
                 }}\n"
            )
        }
    }
}

pub(super) fn render(
    plan: &RenderPlan<'_>,
    ctx: &RenderContext<'_>,
) -> Result<RenderOutcome, RenderError> {
    let mut output = TargetOutput::new(plan.target);
    let mut rendered = 0;

    for entry in &plan.entries {
        let Some(aur) = project(entry, ctx) else {
            continue;
        };
        let dir = &aur.packaging.package_name;
        output.add(format!("{dir}/PKGBUILD"), aur.pkgbuild());
        output.add(format!("{dir}/.SRCINFO"), aur.srcinfo());
        rendered += 1;
    }

    Ok(RenderOutcome {
        output,
        skipped: Vec::new(),
        rendered,
    })
}

fn project<'a>(entry: &PlanEntry<'a>, ctx: &'a RenderContext<'_>) -> Option<AurRender<'a>> {
    let record = &entry.app.record;
    let packaging = ctx.config.app(record.slug.as_str())?.aur.as_ref()?;
    let key = syndic_schema::DownloadKey::new(Platform::Linux, Arch::X86_64);
    let download = entry.app.downloads.get(&key)?;

    let app_name = packaging
        .package_name
        .strip_suffix("-bin")
        .unwrap_or(&packaging.package_name)
        .to_string();
    let extension = extension_of(&download.url);

    Some(AurRender {
        packaging,
        maintainer: &ctx.config.repo.maintainer,
        source_name: format!("{app_name}-{}.{extension}", record.version),
        app_name,
        // AUR pkgver forbids hyphens.
        pkgver: record.version.as_str().replace('-', "_"),
        pkgdesc: record.description.replace('"', "\\\""),
        url: record.homepage.clone(),
        license: record.license.clone(),
        source_url: download.url.clone(),
        sha256: download.digest.to_string(),
    })
}

/// File extension of an artifact URL, keeping compound archive
/// suffixes intact.
fn extension_of(url: &str) -> String {
    let file = url.rsplit('/').next().unwrap_or(url);
    let lower = file.to_lowercase();
    for compound in ["tar.gz", "tar.xz", "tar.zst"] {
        if lower.ends_with(compound) {
            return (*compound).to_string();
        }
    }
    file.rsplit_once('.')
        .map_or_else(|| "bin".to_string(), |(_, ext)| ext.to_string())
}

fn bash_array(key: &str, values: &[String]) -> String {
    if values.is_empty() {
        return String::new();
    }
    let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
    format!("{key}=({})\n", quoted.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::{context_parts, cycle_record, plan_of};
    use crate::render::{BrewPlatform, Target};
    use std::path::Path;

    fn render_records(records: &[crate::plan::CycleRecord]) -> RenderOutcome {
        let (config, state, now) = context_parts();
        let ctx = RenderContext {
            config: &config,
            platform: BrewPlatform::Both,
            previous: &state,
            generated_at: now,
        };
        let plan = plan_of(Target::Aur, records);
        render(&plan, &ctx).unwrap()
    }

    #[test]
    fn emits_package_dir_per_configured_app() {
        let records = vec![
            cycle_record("finar", "2.3.1", Platform::Linux, "zip"),
            // "plain" has no [apps.aur] block in the fixture roster.
            cycle_record("plain", "1.0.0", Platform::Linux, "zip"),
        ];
        let outcome = render_records(&records);

        assert_eq!(outcome.rendered, 1);
        assert!(outcome.output.files.contains_key(Path::new("finar-bin/PKGBUILD")));
        assert!(outcome.output.files.contains_key(Path::new("finar-bin/.SRCINFO")));
        assert!(!outcome
            .output
            .files
            .keys()
            .any(|p| p.starts_with("plain-bin")));
    }

    #[test]
    fn macos_only_apps_are_skipped() {
        let records = vec![cycle_record("finar", "2.3.1", Platform::Macos, "dmg")];
        let outcome = render_records(&records);
        assert_eq!(outcome.rendered, 0);
        assert!(outcome.output.files.is_empty());
    }

    #[test]
    fn pkgbuild_fields_are_complete() {
        let records = vec![cycle_record("finar", "2.3.1", Platform::Linux, "zip")];
        let outcome = render_records(&records);
        let pkgbuild = String::from_utf8(
            outcome.output.files[Path::new("finar-bin/PKGBUILD")].clone(),
        )
        .unwrap();

        assert!(pkgbuild.starts_with("# Maintainer: OpenLyst"));
        assert!(pkgbuild.contains("pkgname=finar-bin\n"));
        assert!(pkgbuild.contains("pkgver=2.3.1\n"));
        assert!(pkgbuild.contains("arch=('x86_64')\n"));
        assert!(pkgbuild.contains("depends=('gtk3')\n"));
        assert!(pkgbuild.contains("provides=('finar')\n"));
        assert!(pkgbuild.contains("conflicts=('finar')\n"));
        assert!(pkgbuild.contains("sha256sums=('"));
        assert!(pkgbuild.contains("package() {"));
    }

    #[test]
    fn pkgver_replaces_hyphens() {
        let records = vec![cycle_record("finar", "2.3.1-beta", Platform::Linux, "zip")];
        let outcome = render_records(&records);
        let pkgbuild = String::from_utf8(
            outcome.output.files[Path::new("finar-bin/PKGBUILD")].clone(),
        )
        .unwrap();
        assert!(pkgbuild.contains("pkgver=2.3.1_beta\n"));
    }

    #[test]
    fn srcinfo_agrees_with_pkgbuild() {
        let records = vec![cycle_record("finar", "2.3.1", Platform::Linux, "zip")];
        let outcome = render_records(&records);
        let pkgbuild = String::from_utf8(
            outcome.output.files[Path::new("finar-bin/PKGBUILD")].clone(),
        )
        .unwrap();
        let srcinfo = String::from_utf8(
            outcome.output.files[Path::new("finar-bin/.SRCINFO")].clone(),
        )
        .unwrap();

        // Every value stated in .SRCINFO must appear in the PKGBUILD.
        assert!(srcinfo.starts_with("pkgbase = finar-bin\n"));
        assert!(srcinfo.contains("\tpkgver = 2.3.1\n"));
        assert!(srcinfo.contains("\tdepends = gtk3\n"));
        let sha_line = srcinfo
            .lines()
            .find(|l| l.trim_start().starts_with("sha256sums = "))
            .unwrap();
        let sha = sha_line.rsplit(' ').next().unwrap();
        assert!(pkgbuild.contains(&format!("sha256sums=('{sha}')")));
        assert!(srcinfo.trim_end().ends_with("pkgname = finar-bin"));
    }

    #[test]
    fn appimage_sources_install_under_opt() {
        let records = vec![cycle_record("finar", "2.3.1", Platform::Linux, "AppImage")];
        let outcome = render_records(&records);
        let pkgbuild = String::from_utf8(
            outcome.output.files[Path::new("finar-bin/PKGBUILD")].clone(),
        )
        .unwrap();
        assert!(pkgbuild.contains("/opt/finar/finar.AppImage"));
        assert!(pkgbuild.contains("ln -s"));
    }
}
