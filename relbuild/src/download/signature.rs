//! Detached signature verification.

use crate::errors::{IntegrityError, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Protocol for checking a detached signature against an archive.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Succeeds only when `signature` is a valid signature of `archive`.
    async fn verify(&self, signature: &Path, archive: &Path) -> Result<()>;
}

/// Runs an external tool as `{program} --verify {signature} {archive}`.
/// A zero exit status is success.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: String,
}

impl CommandVerifier {
    /// Creates a verifier for `program` (e.g. `gpg`).
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The program being invoked.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandVerifier {
    fn default() -> Self {
        Self::new("gpg")
    }
}

#[async_trait]
impl SignatureVerifier for CommandVerifier {
    async fn verify(&self, signature: &Path, archive: &Path) -> Result<()> {
        debug!(program = %self.program, archive = %archive.display(), "Verifying signature");
        let bad = |reason: String| IntegrityError::BadSignature {
            path: archive.to_path_buf(),
            reason,
        };
        let output = Command::new(&self.program)
            .arg("--verify")
            .arg(signature)
            .arg(archive)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| bad(format!("could not run {}: {e}", self.program)))?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(bad(format!("{}: {}", output.status, stderr.trim())).into())
        }
    }
}
