//! Platforms and target triplets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system family a build targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Linux with glibc.
    Linux,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
}

impl Platform {
    /// The platform relbuild is running on.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// Suffix appended to the architecture to form a triplet.
    #[must_use]
    pub fn triplet_suffix(self) -> &'static str {
        match self {
            Self::Linux => "linux-gnu",
            Self::MacOs => "macos",
            Self::Windows => "win",
        }
    }

    /// Extension of the final archive.
    #[must_use]
    pub fn archive_extension(self) -> &'static str {
        "tar.xz"
    }

    /// Whether relbuild manages a cross toolchain for this platform.
    #[must_use]
    pub fn uses_managed_toolchain(self) -> bool {
        matches!(self, Self::Linux)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::MacOs => write!(f, "darwin"),
            Self::Windows => write!(f, "win32"),
        }
    }
}

/// Architecture plus platform, e.g. `x86_64-linux-gnu`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triplet {
    arch: String,
    platform: Platform,
}

impl Triplet {
    /// Creates a triplet.
    #[must_use]
    pub fn new(arch: impl Into<String>, platform: Platform) -> Self {
        Self {
            arch: arch.into().to_lowercase(),
            platform,
        }
    }

    /// A triplet for `arch` on the current platform.
    #[must_use]
    pub fn for_arch(arch: impl Into<String>) -> Self {
        Self::new(arch, Platform::current())
    }

    /// The triplet of the machine running the build.
    #[must_use]
    pub fn build_host() -> Self {
        Self::for_arch(std::env::consts::ARCH)
    }

    /// The architecture component.
    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// The platform component.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.platform.triplet_suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triplet_formatting() {
        assert_eq!(Triplet::new("x86_64", Platform::Linux).to_string(), "x86_64-linux-gnu");
        assert_eq!(Triplet::new("arm64", Platform::MacOs).to_string(), "arm64-macos");
        assert_eq!(Triplet::new("amd64", Platform::Windows).to_string(), "amd64-win");
    }

    #[test]
    fn test_arch_is_lowercased() {
        assert_eq!(Triplet::new("AARCH64", Platform::Linux).arch(), "aarch64");
    }

    #[test]
    fn test_build_host_matches_current_platform() {
        let host = Triplet::build_host();
        assert_eq!(host.platform(), Platform::current());
        assert_eq!(host.arch(), std::env::consts::ARCH);
    }

    #[test]
    fn test_managed_toolchain_only_on_linux() {
        assert!(Platform::Linux.uses_managed_toolchain());
        assert!(!Platform::MacOs.uses_managed_toolchain());
    }
}
