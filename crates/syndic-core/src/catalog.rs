//! Upstream catalog client.
//!
//! Issues one `GET {base}/api/v1/apps/{slug}/latest` per roster entry,
//! with exponential backoff on network/5xx failures. A 4xx response or
//! a malformed body is a per-app schema error: the app is skipped and
//! the cycle continues.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use syndic_schema::{AppRecord, AppSlug, DownloadKey, Platform, Sha256Digest, Version};

use crate::config::{AppEntry, CatalogConfig};

/// Per-app fetch failures.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Network failure or 5xx after bounded retries; the app is
    /// skipped for this cycle but may succeed next run.
    #[error("transient fetch failure for '{slug}': {reason}")]
    Transient {
        /// App the failure belongs to.
        slug: AppSlug,
        /// Last observed failure.
        reason: String,
    },

    /// The catalog answered but the response is unusable for this app
    /// (4xx, `success: false`, or missing required fields).
    #[error("schema error for '{slug}': {reason}")]
    Schema {
        /// App the failure belongs to.
        slug: AppSlug,
        /// What was wrong with the response.
        reason: String,
    },
}

impl CatalogError {
    /// The slug this error belongs to.
    pub fn slug(&self) -> &AppSlug {
        match self {
            Self::Transient { slug, .. } | Self::Schema { slug, .. } => slug,
        }
    }
}

/// Wire envelope: `{"success": bool, "data": {...}}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    data: Option<LatestVersion>,
}

/// The `data` payload of a `/latest` response.
///
/// `downloads` is platform -> package type -> arch -> url. The package
/// type layer ("zip", "exe", "dmg", ...) is flattened away during
/// normalization using a fixed priority order.
#[derive(Debug, Deserialize)]
struct LatestVersion {
    version: String,
    #[serde(default)]
    downloads: BTreeMap<String, BTreeMap<String, BTreeMap<String, DownloadSpec>>>,
}

/// A download leaf: either a bare URL or an object carrying a declared
/// digest and size alongside it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DownloadSpec {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        sha256: Option<Sha256Digest>,
    },
}

impl DownloadSpec {
    fn url(&self) -> &str {
        match self {
            Self::Url(u) | Self::Detailed { url: u, .. } => u,
        }
    }

    fn declared_digest(&self) -> Option<&Sha256Digest> {
        match self {
            Self::Url(_) => None,
            Self::Detailed { sha256, .. } => sha256.as_ref(),
        }
    }
}

/// Preference order when an app publishes several package types for
/// the same platform (native installers before plain archives).
const TYPE_PRIORITY: &[&str] = &[
    "ipa", "apk", "dmg", "pkg", "exe", "msi", "msix", "appimage", "zip", "tar.gz",
];

/// Client for the upstream catalog API.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
    backoff_base: Duration,
    concurrency: usize,
}

impl CatalogClient {
    /// Build a client from the catalog configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &CatalogConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retries: config.retries,
            backoff_base: Duration::from_millis(500),
            concurrency: config.concurrency.max(1),
        })
    }

    /// Override the backoff base delay (tests use a short one).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Fetch the latest version record for every roster entry, with a
    /// bounded worker pool. Results are returned in slug order.
    pub async fn fetch_all(
        &self,
        roster: &[AppEntry],
    ) -> Vec<(AppSlug, Result<AppRecord, CatalogError>)> {
        let mut results: Vec<_> = stream::iter(roster)
            .map(|entry| async move {
                let slug = AppSlug::new(&entry.slug);
                let result = self.fetch_latest(entry).await;
                (slug, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Fetch and normalize one app's latest version.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Transient`] after bounded retries on network or
    /// 5xx failures; [`CatalogError::Schema`] for anything the catalog
    /// answered but syndic cannot use.
    pub async fn fetch_latest(&self, entry: &AppEntry) -> Result<AppRecord, CatalogError> {
        let slug = AppSlug::new(&entry.slug);
        let url = format!("{}/api/v1/apps/{}/latest", self.base_url, slug);

        let mut last_failure = String::new();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                debug!(%slug, attempt, ?delay, "retrying catalog fetch");
                tokio::time::sleep(delay).await;
            }

            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_client_error() {
                        return Err(CatalogError::Schema {
                            slug,
                            reason: format!("catalog returned {status}"),
                        });
                    }
                    if !status.is_success() {
                        last_failure = format!("catalog returned {status}");
                        continue;
                    }
                    let envelope: Envelope =
                        response.json().await.map_err(|e| CatalogError::Schema {
                            slug: slug.clone(),
                            reason: format!("invalid response body: {e}"),
                        })?;
                    return self.normalize(entry, slug, envelope);
                }
                Err(e) => {
                    last_failure = e.to_string();
                }
            }
        }

        Err(CatalogError::Transient {
            slug,
            reason: last_failure,
        })
    }

    /// Exponential backoff with jitter: `base * 2^(attempt-1) + 0..250ms`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base * 2u32.saturating_pow(attempt - 1);
        let jitter = rand::rng().random_range(0..250);
        exp + Duration::from_millis(jitter)
    }

    /// Turn a wire envelope into a validated [`AppRecord`].
    fn normalize(
        &self,
        entry: &AppEntry,
        slug: AppSlug,
        envelope: Envelope,
    ) -> Result<AppRecord, CatalogError> {
        if !envelope.success {
            return Err(CatalogError::Schema {
                slug,
                reason: "catalog reported success=false".to_string(),
            });
        }
        let Some(data) = envelope.data else {
            return Err(CatalogError::Schema {
                slug,
                reason: "response carries no data".to_string(),
            });
        };

        let mut downloads = BTreeMap::new();
        let mut declared_digests = BTreeMap::new();
        for (platform_name, by_type) in &data.downloads {
            let Ok(platform) = platform_name.parse::<Platform>() else {
                warn!(%slug, platform = %platform_name, "ignoring unknown platform");
                continue;
            };
            flatten_platform(platform, by_type, &mut downloads, &mut declared_digests);
        }

        let record = AppRecord {
            slug: slug.clone(),
            name: entry.name.clone(),
            description: entry.description.clone(),
            license: entry.license.clone(),
            homepage: entry.homepage.clone(),
            version: Version::new(&data.version),
            downloads,
            declared_digests,
            subtitle: entry.subtitle.clone(),
            bundle_identifier: entry.bundle_identifier.clone(),
            icon_url: None,
            tint_color: None,
            category: entry.category.clone(),
            screenshots: Vec::new(),
            permissions: Vec::new(),
        };

        record.validate().map_err(|e| CatalogError::Schema {
            slug,
            reason: e.to_string(),
        })?;
        Ok(record)
    }
}

/// Flatten one platform's type -> arch -> url map into per-arch URLs,
/// preferring native installer types over plain archives. The first
/// type in priority order wins for each architecture.
fn flatten_platform(
    platform: Platform,
    by_type: &BTreeMap<String, BTreeMap<String, DownloadSpec>>,
    downloads: &mut BTreeMap<DownloadKey, String>,
    declared_digests: &mut BTreeMap<DownloadKey, Sha256Digest>,
) {
    let ranked = TYPE_PRIORITY
        .iter()
        .filter_map(|t| by_type.get(*t).map(|m| (*t, m)));
    // Types the priority list does not know about still get a chance,
    // after the ranked ones.
    let unranked = by_type
        .iter()
        .filter(|(t, _)| !TYPE_PRIORITY.contains(&t.as_str()))
        .map(|(t, m)| (t.as_str(), m));

    for (_type_name, by_arch) in ranked.chain(unranked) {
        for (arch_name, spec) in by_arch {
            let Ok(arch) = arch_name.parse() else {
                continue;
            };
            let key = DownloadKey::new(platform, arch);
            if downloads.contains_key(&key) {
                continue;
            }
            if spec.url().is_empty() {
                continue;
            }
            downloads.insert(key, spec.url().to_string());
            if let Some(digest) = spec.declared_digest() {
                declared_digests.insert(key, digest.clone());
            }
        }
    }
}
