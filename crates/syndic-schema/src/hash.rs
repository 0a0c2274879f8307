use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// A validated SHA256 digest (64 hex characters, stored lowercase).
///
/// This newtype ensures that all digests in the system are validated at
/// construction and deserialization time, preventing invalid hex strings
/// from propagating into rendered manifests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Create a new `Sha256Digest`, validating the input.
    ///
    /// Accepts strings with or without a `sha256:` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex portion is not exactly 64 ASCII hex
    /// characters.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let hex = s.strip_prefix("sha256:").unwrap_or(&s);

        if hex.len() != 64 {
            anyhow::bail!(
                "Invalid SHA256 digest: expected 64 hex characters, got {} in '{s}'",
                hex.len(),
            );
        }

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Invalid SHA256 digest: contains non-hex characters in '{s}'");
        }

        Ok(Self(hex.to_lowercase()))
    }

    /// Compute the digest of an in-memory byte slice.
    ///
    /// Streaming paths should feed a `sha2::Sha256` incrementally and
    /// finish with [`Sha256Digest::from_hasher`] instead.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    /// Finalize an incrementally fed hasher into a digest.
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the digest as a lowercase hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Uppercase hex rendering (the Winget REST schema convention).
    pub fn to_uppercase_hex(&self) -> String {
        self.0.to_uppercase()
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA256 of the ASCII bytes "hello world", computed independently.
    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn compute_matches_reference_digest() {
        let digest = Sha256Digest::compute(b"hello world");
        assert_eq!(digest.as_str(), HELLO_WORLD);
    }

    #[test]
    fn accepts_prefixed_and_uppercase_input() {
        let d1 = Sha256Digest::new(format!("sha256:{HELLO_WORLD}")).unwrap();
        let d2 = Sha256Digest::new(HELLO_WORLD.to_uppercase()).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1.as_str(), HELLO_WORLD);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Sha256Digest::new("abc123").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "z".repeat(64);
        assert!(Sha256Digest::new(bad).is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<Sha256Digest, _> = serde_json::from_str(&format!("\"{HELLO_WORLD}\""));
        assert!(ok.is_ok());
        let bad: Result<Sha256Digest, _> = serde_json::from_str("\"nothex\"");
        assert!(bad.is_err());
    }

    #[test]
    fn incremental_equals_oneshot() {
        let mut hasher = Sha256::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(Sha256Digest::from_hasher(hasher).as_str(), HELLO_WORLD);
    }
}
