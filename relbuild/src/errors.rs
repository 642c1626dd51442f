//! Error types for relbuild.
//!
//! The taxonomy separates failures that are always fatal to a run (downloads,
//! integrity, prerequisites) from failures that are isolated to a dependency
//! subtree (build actions and the cancellations they cascade into).

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = BuildError> = std::result::Result<T, E>;

/// The main error type for relbuild operations.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A transport failure with no usable fallback URL.
    #[error("Download of {url} failed: {reason}")]
    Download {
        /// The URL that was being fetched.
        url: String,
        /// Transport error detail.
        reason: String,
    },

    /// A checksum or signature did not validate.
    #[error("{0}")]
    Integrity(#[from] IntegrityError),

    /// A required toolchain or interpreter is absent.
    #[error("Missing prerequisites: {}", .0.join("; "))]
    PrerequisiteMissing(Vec<String>),

    /// A build action exited non-zero or faulted.
    #[error("Build action for step '{step}' failed: {reason}")]
    BuildAction {
        /// The failing step.
        step: String,
        /// Failure detail, also written to the step log.
        reason: String,
    },

    /// A step never ran because one of its ancestors failed.
    #[error("Step '{step}' cancelled because dependency '{dependency}' failed")]
    DependencyCascade {
        /// The cancelled step.
        step: String,
        /// The dependency whose failure caused the cancellation.
        dependency: String,
    },

    /// One or more downloads failed; no step was built.
    #[error("Downloads failed for: {}", .0.join(", "))]
    DownloadPhase(Vec<String>),

    /// One or more steps failed or were cancelled.
    #[error("Build failed for: {}", .failed.join(", "))]
    BuildPhase {
        /// Failing and cancelled step names.
        failed: Vec<String>,
        /// Bounded log tails of the failing steps.
        log_tails: String,
    },

    /// Packaging the finished prefix failed.
    #[error("Finalize failed: {0}")]
    Finalize(String),

    /// A requested step is not registered.
    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    /// Invalid configuration or step graph.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Creating or reading an archive failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// A version check could not be carried out.
    #[error("Version check failed: {0}")]
    VersionCheck(String),

    /// The operator interrupted the build.
    #[error("Build interrupted: {0}")]
    Interrupted(String),

    /// HTTP client construction error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Creates a download error.
    #[must_use]
    pub fn download(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures that must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::BuildAction { .. } | Self::DependencyCascade { .. }
        )
    }
}

/// Integrity failures. These always fail closed.
#[derive(Debug, Clone, Error)]
pub enum IntegrityError {
    /// The recomputed checksum differs from the configured one.
    #[error("{algorithm} checksum mismatch for {}: expected {expected}, found {actual}", path.display())]
    ChecksumMismatch {
        /// The checked file.
        path: PathBuf,
        /// Digest algorithm name.
        algorithm: String,
        /// Configured digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// The signature tool rejected the archive, or no signature was obtainable.
    #[error("Signature verification failed for {}: {reason}", path.display())]
    BadSignature {
        /// The archive being verified.
        path: PathBuf,
        /// Tool output or fetch error.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prerequisite_message_joins_checks() {
        let err = BuildError::PrerequisiteMissing(vec!["no toolchain".into(), "no native".into()]);
        assert_eq!(err.to_string(), "Missing prerequisites: no toolchain; no native");
    }

    #[test]
    fn test_fatality() {
        assert!(BuildError::DownloadPhase(vec!["zlib".into()]).is_fatal());
        assert!(!BuildError::BuildAction {
            step: "zlib".into(),
            reason: "exit 2".into()
        }
        .is_fatal());
        assert!(!BuildError::DependencyCascade {
            step: "python".into(),
            dependency: "zlib".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_integrity_converts() {
        let err: BuildError = IntegrityError::ChecksumMismatch {
            path: PathBuf::from("/tmp/a.tar.gz"),
            algorithm: "md5".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        }
        .into();
        assert!(err.to_string().contains("md5 checksum mismatch for /tmp/a.tar.gz"));
    }
}
