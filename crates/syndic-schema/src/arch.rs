use serde::{Deserialize, Serialize};

/// A distribution platform as named by the upstream catalog.
///
/// The serde renames match the catalog's wire strings exactly
/// (`"iOS"`, `"macOS"`, ...), so these variants deserialize straight
/// out of the `downloads` map of a catalog response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    /// Apple iOS (`.ipa` artifacts, AltStore target).
    #[serde(rename = "iOS")]
    Ios,
    /// Apple macOS (`.dmg`/`.zip` artifacts, Homebrew cask target).
    #[serde(rename = "macOS")]
    Macos,
    /// Linux (`.zip` artifacts, Homebrew formula and AUR targets).
    #[serde(rename = "Linux")]
    Linux,
    /// Microsoft Windows (`.exe`/`.msi` artifacts, Winget target).
    #[serde(rename = "Windows")]
    Windows,
    /// Android (`.apk` artifacts, F-Droid target).
    #[serde(rename = "Android")]
    Android,
}

impl Platform {
    /// Catalog wire name for this platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ios => "iOS",
            Self::Macos => "macOS",
            Self::Linux => "Linux",
            Self::Windows => "Windows",
            Self::Android => "Android",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ios" => Ok(Self::Ios),
            "macos" | "osx" | "darwin" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            "windows" | "win" => Ok(Self::Windows),
            "android" => Ok(Self::Android),
            _ => Err(format!("Unknown platform: {s}")),
        }
    }
}

/// CPU architecture of a downloadable artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// `x86_64` (Intel/AMD 64-bit).
    X86_64,
    /// ARM64 (`aarch64` in Rust convention, `arm64` in catalog and
    /// Winget conventions).
    #[serde(alias = "aarch64")]
    Arm64,
    /// Universal binary (fat artifact covering both).
    Universal,
}

impl Arch {
    /// Catalog wire name (`x86_64` / `arm64` / `universal`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
            Self::Universal => "universal",
        }
    }

    /// Winget REST architecture name (`x64` / `arm64` / `neutral`).
    pub fn winget_name(&self) -> &'static str {
        match self {
            Self::X86_64 => "x64",
            Self::Arm64 => "arm64",
            Self::Universal => "neutral",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "universal" | "neutral" => Ok(Self::Universal),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_wire_names_round_trip() {
        for p in [
            Platform::Ios,
            Platform::Macos,
            Platform::Linux,
            Platform::Windows,
            Platform::Android,
        ] {
            let json = serde_json::to_string(&p).unwrap();
            let back: Platform = serde_json::from_str(&json).unwrap();
            assert_eq!(p, back);
        }
        assert_eq!(serde_json::to_string(&Platform::Macos).unwrap(), "\"macOS\"");
    }

    #[test]
    fn arch_accepts_aarch64_alias() {
        let a: Arch = serde_json::from_str("\"aarch64\"").unwrap();
        assert_eq!(a, Arch::Arm64);
    }

    #[test]
    fn arch_winget_names() {
        assert_eq!(Arch::X86_64.winget_name(), "x64");
        assert_eq!(Arch::Arm64.winget_name(), "arm64");
    }
}
