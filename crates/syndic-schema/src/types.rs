use std::borrow::Borrow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arch::{Arch, Platform};
use crate::hash::Sha256Digest;

/// A normalized application identifier (catalog slug).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppSlug(String);

impl AppSlug {
    /// Create a new slug, normalizing the input to lowercase.
    pub fn new(s: &str) -> Self {
        Self(s.to_lowercase())
    }

    /// Return the normalized slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AppSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AppSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AppSlug {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AppSlug {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AppSlug {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl PartialEq<str> for AppSlug {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl PartialEq<&str> for AppSlug {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.to_lowercase()
    }
}

/// An application version string, stored as published by the catalog.
///
/// Ordering parses both sides as semver when possible and falls back to
/// a lexicographic comparison for non-semver strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

impl Version {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (
            semver::Version::parse(&self.0),
            semver::Version::parse(&other.0),
        ) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Key identifying one distinct download artifact of an app.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DownloadKey {
    /// Platform the artifact targets.
    pub platform: Platform,
    /// Architecture the artifact was built for.
    pub arch: Arch,
}

impl DownloadKey {
    /// Create a new key.
    pub fn new(platform: Platform, arch: Arch) -> Self {
        Self { platform, arch }
    }
}

impl std::fmt::Display for DownloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.platform, self.arch)
    }
}

/// Errors raised when validating an [`AppRecord`].
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    /// A required field (version) is empty.
    #[error("Empty field: {0}")]
    EmptyField(&'static str),

    /// The record declares no download artifacts at all.
    #[error("No downloads declared for '{0}'")]
    NoDownloads(AppSlug),

    /// A download URL is malformed or uses an unsupported scheme.
    #[error("Invalid URL for {key}: {url}")]
    InvalidUrl {
        /// Platform/arch pair the URL belongs to.
        key: DownloadKey,
        /// The offending URL.
        url: String,
    },
}

/// Normalized application metadata for one sync cycle.
///
/// Built by the catalog client from the roster configuration plus one
/// catalog API response. Immutable once fetched; the verifier annotates
/// records externally via [`VerifiedDownload`] maps rather than
/// mutating them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    /// Catalog slug identifying the app.
    pub slug: AppSlug,
    /// Human-readable display name.
    pub name: String,
    /// Human description.
    pub description: String,
    /// SPDX-ish license string (e.g. "GPL3").
    pub license: String,
    /// Upstream source / homepage URL.
    pub homepage: String,
    /// Current version string as reported by the catalog.
    pub version: Version,
    /// One download URL per declared platform/architecture pair.
    pub downloads: BTreeMap<DownloadKey, String>,
    /// Digests declared by the upstream catalog, when present.
    #[serde(default)]
    pub declared_digests: BTreeMap<DownloadKey, Sha256Digest>,
    /// Optional short tagline.
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Optional reverse-DNS bundle identifier (AltStore / F-Droid).
    #[serde(default)]
    pub bundle_identifier: Option<String>,
    /// Optional icon URL.
    #[serde(default)]
    pub icon_url: Option<String>,
    /// Optional UI tint color (hex, e.g. "#dc2626").
    #[serde(default)]
    pub tint_color: Option<String>,
    /// Optional store category.
    #[serde(default)]
    pub category: Option<String>,
    /// Optional screenshot URLs.
    #[serde(default)]
    pub screenshots: Vec<String>,
    /// Optional declared permissions / entitlements.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl AppRecord {
    /// Effective bundle identifier: the declared one, or a deterministic
    /// fallback derived from the slug.
    pub fn bundle_id(&self) -> String {
        self.bundle_identifier
            .clone()
            .unwrap_or_else(|| format!("ink.openlyst.{}", self.slug))
    }

    /// Look up the download URL for one platform/arch pair.
    pub fn download_url(&self, platform: Platform, arch: Arch) -> Option<&str> {
        self.downloads
            .get(&DownloadKey::new(platform, arch))
            .map(String::as_str)
    }

    /// First declared download for a platform, in deterministic arch
    /// order.
    pub fn any_download_for(&self, platform: Platform) -> Option<(DownloadKey, &str)> {
        self.downloads
            .iter()
            .find(|(k, _)| k.platform == platform)
            .map(|(k, url)| (*k, url.as_str()))
    }

    /// Validate the record's required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the version is empty, no downloads are
    /// declared, or any download URL is not http(s).
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.version.as_str().is_empty() {
            return Err(RecordError::EmptyField("version"));
        }
        if self.downloads.is_empty() {
            return Err(RecordError::NoDownloads(self.slug.clone()));
        }
        for (key, url) in &self.downloads {
            if !url.starts_with("http") {
                return Err(RecordError::InvalidUrl {
                    key: *key,
                    url: url.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Tag identifying the digest algorithm of a [`VerifiedDownload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256 (the only algorithm currently emitted).
    #[default]
    Sha256,
}

/// An artifact whose bytes were fetched (or cache-resolved) and hashed
/// during the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedDownload {
    /// The artifact URL that was hashed.
    pub url: String,
    /// Total byte length observed while hashing.
    pub length: u64,
    /// Content digest of the artifact bytes.
    pub digest: Sha256Digest,
    /// Algorithm used to produce `digest`.
    pub algorithm: DigestAlgorithm,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(slug: &str) -> AppRecord {
        let mut downloads = BTreeMap::new();
        downloads.insert(
            DownloadKey::new(Platform::Linux, Arch::X86_64),
            "https://cdn.example.com/app-1.0.0.zip".to_string(),
        );
        AppRecord {
            slug: AppSlug::new(slug),
            name: "App".to_string(),
            description: "An app".to_string(),
            license: "GPL3".to_string(),
            homepage: "https://example.com".to_string(),
            version: Version::new("1.0.0"),
            downloads,
            declared_digests: BTreeMap::new(),
            subtitle: None,
            bundle_identifier: None,
            icon_url: None,
            tint_color: None,
            category: None,
            screenshots: Vec::new(),
            permissions: Vec::new(),
        }
    }

    #[test]
    fn slug_normalizes_to_lowercase() {
        assert_eq!(AppSlug::new("Finar").as_str(), "finar");
        assert_eq!(AppSlug::new("finar"), "FINAR");
    }

    #[test]
    fn version_orders_semver_before_lexicographic() {
        assert!(Version::new("2.10.0") > Version::new("2.9.1"));
        assert!(Version::new("1.0.0") < Version::new("not-semver"));
    }

    #[test]
    fn validate_accepts_well_formed_record() {
        assert!(record("docan").validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_downloads() {
        let mut rec = record("docan");
        rec.downloads.clear();
        assert!(matches!(rec.validate(), Err(RecordError::NoDownloads(_))));
    }

    #[test]
    fn validate_rejects_non_http_url() {
        let mut rec = record("docan");
        rec.downloads.insert(
            DownloadKey::new(Platform::Macos, Arch::Arm64),
            "ftp://example.com/app.dmg".to_string(),
        );
        assert!(matches!(rec.validate(), Err(RecordError::InvalidUrl { .. })));
    }

    #[test]
    fn bundle_id_falls_back_to_slug() {
        let rec = record("docan");
        assert_eq!(rec.bundle_id(), "ink.openlyst.docan");
    }

    #[test]
    fn download_keys_sort_by_platform_then_arch() {
        let a = DownloadKey::new(Platform::Ios, Arch::Arm64);
        let b = DownloadKey::new(Platform::Linux, Arch::X86_64);
        assert!(a < b);
    }
}
