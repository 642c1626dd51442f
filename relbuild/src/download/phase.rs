//! Download phase runner.

use super::artifact::Download;
use super::fetcher::Fetcher;
use super::signature::SignatureVerifier;
use crate::errors::{BuildError, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// What the download phase did for each step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Steps whose archive was fetched from the network.
    pub fetched: Vec<String>,
    /// Steps served from a validated cache.
    pub cached: Vec<String>,
}

/// Fetches and verifies every artifact concurrently, all-or-nothing.
///
/// Each artifact gets its own worker; a failing worker never stops the others.
/// The phase returns only after every worker has terminated.
#[derive(Clone)]
pub struct DownloadPhase {
    fetcher: Arc<dyn Fetcher>,
    verifier: Arc<dyn SignatureVerifier>,
    force: bool,
}

impl std::fmt::Debug for DownloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadPhase")
            .field("force", &self.force)
            .finish_non_exhaustive()
    }
}

impl DownloadPhase {
    /// Creates a runner.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            fetcher,
            verifier,
            force: false,
        }
    }

    /// Re-download even when a validated cached copy exists.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Runs one worker per download and waits for all of them.
    ///
    /// Fails with [`BuildError::DownloadPhase`] naming every failed step.
    pub async fn run(&self, downloads: Vec<Download>) -> Result<DownloadSummary> {
        let start = Instant::now();
        let mut workers = FuturesUnordered::new();
        for download in downloads {
            let name = download.name().to_string();
            let fetcher = Arc::clone(&self.fetcher);
            let verifier = Arc::clone(&self.verifier);
            let force = self.force;
            let handle = tokio::spawn(async move {
                download
                    .acquire(fetcher.as_ref(), verifier.as_ref(), force)
                    .await
            });
            workers.push(async move { (name, handle.await) });
        }

        let mut summary = DownloadSummary::default();
        let mut failed = Vec::new();
        while let Some((name, joined)) = workers.next().await {
            match joined {
                Ok(Ok(outcome)) if outcome.fetched => summary.fetched.push(name),
                Ok(Ok(_)) => summary.cached.push(name),
                Ok(Err(e)) => {
                    error!(step = %name, error = %e, "Download failed");
                    failed.push(name);
                }
                Err(e) => {
                    error!(step = %name, error = %e, "Download worker crashed");
                    failed.push(name);
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            return Err(BuildError::DownloadPhase(failed));
        }
        summary.fetched.sort();
        summary.cached.sort();
        info!(
            fetched = summary.fetched.len(),
            cached = summary.cached.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Downloads complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::fetcher::MockFetcher;
    use crate::download::signature::MockSignatureVerifier;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn verifier() -> Arc<dyn SignatureVerifier> {
        Arc::new(MockSignatureVerifier::new())
    }

    fn download(name: &str, dest: &Path) -> Download {
        Download::new(name, format!("https://example.org/{name}-{{version}}.tar.gz"))
            .with_version("1.0")
            .with_destination(dest)
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch_to().times(2).returning(|_, _| Ok(()));

        let phase = DownloadPhase::new(Arc::new(fetcher), verifier());
        let summary = phase
            .run(vec![download("zlib", tmp.path()), download("xz", tmp.path())])
            .await
            .unwrap();
        assert_eq!(summary.fetched, vec!["xz".to_string(), "zlib".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_reported_after_every_worker_ran() {
        let tmp = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch_to().returning(move |url, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            if url.contains("openssl") || url.contains("bzip2") {
                Err(BuildError::download(url, "503"))
            } else {
                Ok(())
            }
        });

        let phase = DownloadPhase::new(Arc::new(fetcher), verifier());
        let err = phase
            .run(vec![
                download("openssl", tmp.path()),
                download("zlib", tmp.path()),
                download("bzip2", tmp.path()),
                download("xz", tmp.path()),
            ])
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            BuildError::DownloadPhase(names) => {
                assert_eq!(names, vec!["bzip2".to_string(), "openssl".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_checksum_mismatch_after_fetch_fails_phase() {
        let tmp = tempfile::tempdir().unwrap();
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch_to().times(2).returning(|_, dest| {
            std::fs::write(dest, b"tampered")?;
            Ok(())
        });

        let pinned = download("zlib", tmp.path()).with_checksum(crate::download::Checksum::Sha256(
            "0".repeat(64),
        ));
        let phase = DownloadPhase::new(Arc::new(fetcher), verifier());
        let err = phase
            .run(vec![pinned, download("xz", tmp.path())])
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::DownloadPhase(ref names) if names == &vec!["zlib".to_string()]));
        assert!(tmp.path().join("xz-1.0.tar.gz").is_file());
    }

    #[tokio::test]
    async fn test_empty_phase_is_success() {
        let phase = DownloadPhase::new(Arc::new(MockFetcher::new()), verifier());
        assert_eq!(phase.run(Vec::new()).await.unwrap(), DownloadSummary::default());
    }
}
