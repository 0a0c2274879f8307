//! Artifact integrity verification.
//!
//! Streams every declared download and feeds the bytes through an
//! incremental SHA-256, so artifacts are never buffered whole in
//! memory. When the upstream record declares an expected digest, the
//! computed one must match it.
//!
//! Digests are cached per URL within a cycle: if the same URL is seen
//! again with an unchanged reported length, the cached digest is
//! reused. This assumes the upstream binds content to URLs
//! (versioned filenames); a republished artifact at the *same* URL
//! would defeat the cache, which is why the cache never outlives a
//! process.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use syndic_schema::{
    AppRecord, DigestAlgorithm, DownloadKey, Sha256Digest, VerifiedDownload,
};

use crate::config::DigestPolicy;

/// Per-artifact verification failures. Any of these skips the owning
/// app's entry for the cycle; none aborts the run.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Network failure while downloading; transient and retried before
    /// surfacing.
    #[error("download failed for {url}: {reason}")]
    Download {
        /// Artifact URL.
        url: String,
        /// Last observed failure.
        reason: String,
    },

    /// The computed digest disagrees with the upstream-declared one.
    /// Flagged loudly: this may indicate an integrity problem upstream.
    #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Artifact URL.
        url: String,
        /// Digest the catalog declared.
        expected: Sha256Digest,
        /// Digest computed from the fetched bytes.
        actual: Sha256Digest,
    },

    /// `digest_policy = "require-declared"` and the catalog record
    /// carries no reference digest for this artifact.
    #[error("no declared digest for {url} and policy requires one")]
    MissingDeclaredDigest {
        /// Artifact URL.
        url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheEntry {
    length: u64,
    digest: Sha256Digest,
}

/// Streams artifacts and computes content digests.
#[derive(Debug)]
pub struct Verifier {
    client: reqwest::Client,
    policy: DigestPolicy,
    retries: u32,
    backoff_base: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl Verifier {
    /// Create a verifier with the given digest policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(policy: DigestPolicy, timeout_secs: u64, retries: u32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(crate::USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            policy,
            retries,
            backoff_base: Duration::from_millis(500),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Override the backoff base delay (tests use a short one).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Verify every declared download of one app.
    ///
    /// # Errors
    ///
    /// Fails on the first artifact that cannot be verified; the caller
    /// skips the whole app entry for this cycle.
    pub async fn verify(
        &self,
        record: &AppRecord,
    ) -> Result<BTreeMap<DownloadKey, VerifiedDownload>, VerifyError> {
        let mut verified = BTreeMap::new();
        for (key, url) in &record.downloads {
            let declared = record.declared_digests.get(key);
            if declared.is_none() && self.policy == DigestPolicy::RequireDeclared {
                return Err(VerifyError::MissingDeclaredDigest { url: url.clone() });
            }
            let download = self.verify_url(url, declared).await?;
            verified.insert(*key, download);
        }
        Ok(verified)
    }

    /// Stream one URL through SHA-256, consulting the digest cache.
    async fn verify_url(
        &self,
        url: &str,
        declared: Option<&Sha256Digest>,
    ) -> Result<VerifiedDownload, VerifyError> {
        let reported_length = self.head_length(url).await;

        if let Some(length) = reported_length {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(url) {
                if entry.length == length {
                    debug!(url, "digest cache hit");
                    return self.finish(url, length, entry.digest.clone(), declared);
                }
            }
        }

        let (length, digest) = self.stream_and_hash(url).await?;

        self.cache.lock().await.insert(
            url.to_string(),
            CacheEntry {
                length,
                digest: digest.clone(),
            },
        );

        self.finish(url, length, digest, declared)
    }

    /// Compare against the declared digest (when present) and build
    /// the verified record.
    fn finish(
        &self,
        url: &str,
        length: u64,
        digest: Sha256Digest,
        declared: Option<&Sha256Digest>,
    ) -> Result<VerifiedDownload, VerifyError> {
        if let Some(expected) = declared {
            if *expected != digest {
                error!(
                    url,
                    expected = %expected,
                    actual = %digest,
                    "artifact digest mismatch - possible upstream integrity problem"
                );
                return Err(VerifyError::HashMismatch {
                    url: url.to_string(),
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }
        Ok(VerifiedDownload {
            url: url.to_string(),
            length,
            digest,
            algorithm: DigestAlgorithm::Sha256,
        })
    }

    /// Reported content length from a HEAD request, when available.
    async fn head_length(&self, url: &str) -> Option<u64> {
        match self.client.head(url).send().await {
            Ok(resp) if resp.status().is_success() => resp.content_length(),
            _ => None,
        }
    }

    /// Download with retries, hashing incrementally.
    async fn stream_and_hash(&self, url: &str) -> Result<(u64, Sha256Digest), VerifyError> {
        let mut last_failure = String::new();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                warn!(url, attempt, "retrying artifact download");
                tokio::time::sleep(delay).await;
            }
            match self.try_stream(url).await {
                Ok(result) => return Ok(result),
                Err(reason) => last_failure = reason,
            }
        }
        Err(VerifyError::Download {
            url: url.to_string(),
            reason: last_failure,
        })
    }

    async fn try_stream(&self, url: &str) -> Result<(u64, Sha256Digest), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())?;

        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut length: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            hasher.update(&chunk);
            length += chunk.len() as u64;
        }

        Ok((length, Sha256Digest::from_hasher(hasher)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::collections::BTreeMap;
    use syndic_schema::{AppSlug, Arch, Platform, Version};

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn verifier(policy: DigestPolicy) -> Verifier {
        Verifier::new(policy, 5, 1)
            .unwrap()
            .with_backoff_base(Duration::from_millis(1))
    }

    fn record_with(url: &str, declared: Option<&str>) -> AppRecord {
        let key = DownloadKey::new(Platform::Linux, Arch::X86_64);
        let mut downloads = BTreeMap::new();
        downloads.insert(key, url.to_string());
        let mut declared_digests = BTreeMap::new();
        if let Some(d) = declared {
            declared_digests.insert(key, Sha256Digest::new(d).unwrap());
        }
        AppRecord {
            slug: AppSlug::new("docan"),
            name: "Docan".to_string(),
            description: "desc".to_string(),
            license: "GPL3".to_string(),
            homepage: "https://example.com".to_string(),
            version: Version::new("1.0.0"),
            downloads,
            declared_digests,
            subtitle: None,
            bundle_identifier: None,
            icon_url: None,
            tint_color: None,
            category: None,
            screenshots: Vec::new(),
            permissions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn computes_reference_digest() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/docan-1.0.0.zip")
            .with_body("hello world")
            .create_async()
            .await;

        let url = format!("{}/docan-1.0.0.zip", server.url());
        let verified = verifier(DigestPolicy::TrustComputed)
            .verify(&record_with(&url, None))
            .await
            .unwrap();
        let download = verified.values().next().unwrap();
        assert_eq!(download.digest.as_str(), HELLO_WORLD);
        assert_eq!(download.length, 11);
    }

    #[tokio::test]
    async fn declared_digest_match_passes() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/a.zip")
            .with_body("hello world")
            .create_async()
            .await;

        let url = format!("{}/a.zip", server.url());
        let verified = verifier(DigestPolicy::TrustComputed)
            .verify(&record_with(&url, Some(HELLO_WORLD)))
            .await;
        assert!(verified.is_ok());
    }

    #[tokio::test]
    async fn declared_digest_mismatch_fails() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/a.zip")
            .with_body("tampered bytes")
            .create_async()
            .await;

        let url = format!("{}/a.zip", server.url());
        let err = verifier(DigestPolicy::TrustComputed)
            .verify(&record_with(&url, Some(HELLO_WORLD)))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn require_declared_policy_rejects_bare_urls() {
        let err = verifier(DigestPolicy::RequireDeclared)
            .verify(&record_with("https://cdn.example.com/a.zip", None))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::MissingDeclaredDigest { .. }));
    }

    #[tokio::test]
    async fn cache_skips_redownload_for_same_url_and_length() {
        let mut server = Server::new_async().await;
        // One HEAD per verify; exactly one GET despite two verifies.
        let get = server
            .mock("GET", "/a.zip")
            .with_body("hello world")
            .expect(1)
            .create_async()
            .await;
        let _head = server
            .mock("HEAD", "/a.zip")
            .with_header("content-length", "11")
            .expect(2)
            .create_async()
            .await;

        let url = format!("{}/a.zip", server.url());
        let v = verifier(DigestPolicy::TrustComputed);
        let record = record_with(&url, None);

        let first = v.verify(&record).await.unwrap();
        let second = v.verify(&record).await.unwrap();
        assert_eq!(first, second);
        get.assert_async().await;
    }

    #[tokio::test]
    async fn download_failures_surface_after_retries() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/a.zip")
            .with_status(500)
            .expect(2) // retries = 1 means 2 total attempts
            .create_async()
            .await;

        let url = format!("{}/a.zip", server.url());
        let err = verifier(DigestPolicy::TrustComputed)
            .verify(&record_with(&url, None))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Download { .. }));
        m.assert_async().await;
    }
}
