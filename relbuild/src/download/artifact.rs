//! Artifact descriptors.

use super::checksum::Checksum;
use super::fetcher::Fetcher;
use super::signature::SignatureVerifier;
use crate::errors::{BuildError, IntegrityError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maps a hyperlink target from a listing page to a version string.
pub type VersionExtractor = fn(&str) -> Option<String>;

/// Result of [`Download::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Local path of the archive.
    pub path: PathBuf,
    /// Whether a network fetch happened, as opposed to a cache hit.
    pub fetched: bool,
}

/// One fetchable unit owned by a step.
///
/// URL templates are expanded by substituting `{version}`. Fetch and verify
/// are idempotent given the same file contents.
#[derive(Debug, Clone)]
pub struct Download {
    name: String,
    url_template: String,
    fallback_url_template: Option<String>,
    signature_template: Option<String>,
    destination: PathBuf,
    version: String,
    checksum: Option<Checksum>,
    check_url: Option<String>,
    version_extractor: Option<VersionExtractor>,
}

impl Download {
    /// Creates a descriptor for the step `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            fallback_url_template: None,
            signature_template: None,
            destination: PathBuf::new(),
            version: String::new(),
            checksum: None,
            check_url: None,
            version_extractor: None,
        }
    }

    /// Sets the fallback URL template.
    #[must_use]
    pub fn with_fallback(mut self, template: impl Into<String>) -> Self {
        self.fallback_url_template = Some(template.into());
        self
    }

    /// Sets the detached signature URL template.
    #[must_use]
    pub fn with_signature(mut self, template: impl Into<String>) -> Self {
        self.signature_template = Some(template.into());
        self
    }

    /// Sets the expected checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Clears the expected checksum.
    #[must_use]
    pub fn without_checksum(mut self) -> Self {
        self.checksum = None;
        self
    }

    /// Sets the version substituted into the templates.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the destination directory.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Configures the newer-version check. Without `check_url`, the directory
    /// of the download URL is listed.
    #[must_use]
    pub fn with_check(mut self, extractor: VersionExtractor, check_url: Option<String>) -> Self {
        self.version_extractor = Some(extractor);
        self.check_url = check_url;
        self
    }

    /// Owning step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pinned version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Configured checksum.
    #[must_use]
    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    /// Destination directory.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    fn expand(&self, template: &str) -> String {
        template.replace("{version}", &self.version)
    }

    /// Resolved primary URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.expand(&self.url_template)
    }

    /// Resolved fallback URL.
    #[must_use]
    pub fn fallback_url(&self) -> Option<String> {
        self.fallback_url_template.as_deref().map(|t| self.expand(t))
    }

    /// Resolved signature URL.
    #[must_use]
    pub fn signature_url(&self) -> Option<String> {
        self.signature_template.as_deref().map(|t| self.expand(t))
    }

    /// Listing page used by the newer-version check.
    #[must_use]
    pub fn check_url(&self) -> String {
        match self.check_url {
            Some(ref url) => url.clone(),
            None => {
                let url = self.url();
                match url.rsplit_once('/') {
                    Some((dir, _)) => dir.to_string(),
                    None => url,
                }
            }
        }
    }

    /// Local path: basename of the resolved URL under the destination.
    #[must_use]
    pub fn filepath(&self) -> PathBuf {
        self.destination.join(basename(&self.url()))
    }

    /// True iff the file exists and, when a checksum is configured, matches it.
    #[must_use]
    pub fn is_cached_and_valid(&self) -> bool {
        let path = self.filepath();
        if !path.is_file() {
            return false;
        }
        match self.checksum {
            Some(ref checksum) => checksum.matches(&path).unwrap_or(false),
            None => true,
        }
    }

    /// Whether [`Download::acquire`] must go to the network. Only a
    /// checksum-validated cache hit is trusted.
    #[must_use]
    pub fn needs_fetch(&self, force: bool) -> bool {
        force || self.checksum.is_none() || !self.is_cached_and_valid()
    }

    /// Downloads the primary URL, retrying once against the fallback URL on
    /// failure.
    pub async fn fetch(&self, fetcher: &dyn Fetcher) -> Result<FetchOutcome> {
        let path = self.filepath();
        let url = self.url();
        if let Err(primary) = fetcher.fetch_to(&url, &path).await {
            let Some(fallback) = self.fallback_url() else {
                return Err(primary);
            };
            warn!(step = %self.name, error = %primary, fallback = %fallback, "Download failed; trying fallback url");
            fetcher.fetch_to(&fallback, &path).await?;
        }
        Ok(FetchOutcome {
            path,
            fetched: true,
        })
    }

    /// Checks the signature and then the checksum of `path`. Checks that are
    /// not configured are skipped.
    pub async fn verify(
        &self,
        path: &Path,
        fetcher: &dyn Fetcher,
        verifier: &dyn SignatureVerifier,
    ) -> Result<()> {
        if let Some(sig_url) = self.signature_url() {
            let sig_path = self.destination.join(basename(&sig_url));
            fetcher.fetch_to(&sig_url, &sig_path).await.map_err(|e| {
                BuildError::from(IntegrityError::BadSignature {
                    path: path.to_path_buf(),
                    reason: format!("signature unavailable: {e}"),
                })
            })?;
            verifier.verify(&sig_path, path).await?;
        }
        if let Some(ref checksum) = self.checksum {
            let checksum = checksum.clone();
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || checksum.verify(&owned))
                .await
                .map_err(|e| BuildError::Validation(format!("checksum task failed: {e}")))??;
        }
        Ok(())
    }

    /// Fetches unless a validated cached copy exists, then verifies anything
    /// that was freshly fetched.
    pub async fn acquire(
        &self,
        fetcher: &dyn Fetcher,
        verifier: &dyn SignatureVerifier,
        force: bool,
    ) -> Result<FetchOutcome> {
        if let Some(parent) = self.filepath().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let cached = {
            let this = self.clone();
            tokio::task::spawn_blocking(move || !this.needs_fetch(force))
                .await
                .unwrap_or(false)
        };
        if cached {
            debug!(step = %self.name, url = %self.url(), "Already downloaded, skipping");
            return Ok(FetchOutcome {
                path: self.filepath(),
                fetched: false,
            });
        }
        let outcome = self.fetch(fetcher).await?;
        self.verify(&outcome.path, fetcher, verifier).await?;
        Ok(outcome)
    }

    /// Lists the check page and reports versions newer than the pinned one.
    #[cfg(feature = "version-check")]
    pub async fn check_for_newer_version(
        &self,
        fetcher: &dyn Fetcher,
    ) -> Result<super::version::VersionReport> {
        let extractor = self.version_extractor.ok_or_else(|| {
            BuildError::VersionCheck(format!("no version extractor for '{}'", self.name))
        })?;
        let url = self.check_url();
        let page = fetcher.fetch_text(&url).await?;
        let candidates: Vec<String> = super::version::parse_links(&page)
            .iter()
            .filter_map(|href| extractor(href))
            .collect();
        Ok(super::version::compare_versions(&self.version, &candidates))
    }

    /// Whether a newer-version check is configured.
    #[must_use]
    pub fn has_version_check(&self) -> bool {
        self.version_extractor.is_some()
    }
}

fn basename(url: &str) -> &str {
    url.rsplit_once('/').map_or(url, |(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::fetcher::MockFetcher;
    use crate::download::signature::MockSignatureVerifier;
    use mockall::predicate::eq;

    const MD5_HELLO: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

    fn zlib(dest: &Path) -> Download {
        Download::new("zlib", "https://zlib.net/fossils/zlib-{version}.tar.gz")
            .with_version("1.3")
            .with_destination(dest)
    }

    fn no_verifier() -> MockSignatureVerifier {
        let mut verifier = MockSignatureVerifier::new();
        verifier.expect_verify().never();
        verifier
    }

    fn write_hello(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "hello world").unwrap();
    }

    #[test]
    fn test_url_expansion() {
        let d = zlib(Path::new("/cache"))
            .with_fallback("https://mirror/zlib-{version}.tar.gz")
            .with_signature("https://zlib.net/fossils/zlib-{version}.tar.gz.asc");
        assert_eq!(d.url(), "https://zlib.net/fossils/zlib-1.3.tar.gz");
        assert_eq!(d.fallback_url().unwrap(), "https://mirror/zlib-1.3.tar.gz");
        assert_eq!(d.signature_url().unwrap(), "https://zlib.net/fossils/zlib-1.3.tar.gz.asc");
        assert_eq!(d.filepath(), PathBuf::from("/cache/zlib-1.3.tar.gz"));
        assert_eq!(d.check_url(), "https://zlib.net/fossils");
    }

    #[test]
    fn test_cached_and_valid() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path());
        assert!(!d.is_cached_and_valid());

        write_hello(&d.filepath());
        assert!(d.is_cached_and_valid());
        assert!(d.clone().with_checksum(Checksum::Md5(MD5_HELLO.into())).is_cached_and_valid());
        assert!(!d.with_checksum(Checksum::Md5("0".repeat(32))).is_cached_and_valid());
    }

    #[tokio::test]
    async fn test_valid_cache_skips_network() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path()).with_checksum(Checksum::Md5(MD5_HELLO.into()));
        write_hello(&d.filepath());

        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch_to().never();

        let outcome = d.acquire(&fetcher, &no_verifier(), false).await.unwrap();
        assert!(!outcome.fetched);
        assert_eq!(outcome.path, d.filepath());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_triggers_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path()).with_checksum(Checksum::Md5(MD5_HELLO.into()));
        std::fs::write(d.filepath(), "stale").unwrap();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_to()
            .times(1)
            .returning(|_, dest| {
                std::fs::write(dest, "hello world").unwrap();
                Ok(())
            });

        let outcome = d.acquire(&fetcher, &no_verifier(), false).await.unwrap();
        assert!(outcome.fetched);
    }

    #[tokio::test]
    async fn test_force_download_ignores_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path()).with_checksum(Checksum::Md5(MD5_HELLO.into()));
        write_hello(&d.filepath());

        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch_to().times(1).returning(|_, _| Ok(()));

        assert!(d.acquire(&fetcher, &no_verifier(), true).await.unwrap().fetched);
    }

    #[tokio::test]
    async fn test_fallback_is_tried_once() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path()).with_fallback("https://mirror/zlib-{version}.tar.gz");

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_to()
            .with(eq("https://zlib.net/fossils/zlib-1.3.tar.gz"), mockall::predicate::always())
            .times(1)
            .returning(|url, _| Err(BuildError::download(url, "connection reset")));
        fetcher
            .expect_fetch_to()
            .with(eq("https://mirror/zlib-1.3.tar.gz"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = d.fetch(&fetcher).await.unwrap();
        assert!(outcome.fetched);
    }

    #[tokio::test]
    async fn test_failure_without_fallback_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path());

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_to()
            .times(1)
            .returning(|url, _| Err(BuildError::download(url, "404")));

        assert!(matches!(
            d.fetch(&fetcher).await,
            Err(BuildError::Download { .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_with_no_checks_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path());
        write_hello(&d.filepath());
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch_to().never();
        d.verify(&d.filepath(), &fetcher, &no_verifier()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_signature_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path()).with_signature("https://zlib.net/zlib-{version}.tar.gz.asc");
        write_hello(&d.filepath());

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_to()
            .returning(|url, _| Err(BuildError::download(url, "404")));

        let err = d.verify(&d.filepath(), &fetcher, &no_verifier()).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Integrity(IntegrityError::BadSignature { .. })
        ));
    }

    #[tokio::test]
    async fn test_signature_then_checksum() {
        let tmp = tempfile::tempdir().unwrap();
        let d = zlib(tmp.path())
            .with_signature("https://zlib.net/zlib-{version}.tar.gz.asc")
            .with_checksum(Checksum::Md5("0".repeat(32)));
        write_hello(&d.filepath());

        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch_to().times(1).returning(|_, _| Ok(()));
        let mut verifier = MockSignatureVerifier::new();
        verifier.expect_verify().times(1).returning(|_, _| Ok(()));

        let err = d.verify(&d.filepath(), &fetcher, &verifier).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Integrity(IntegrityError::ChecksumMismatch { .. })
        ));
    }

    #[cfg(feature = "version-check")]
    #[tokio::test]
    async fn test_check_for_newer_version() {
        let d = Download::new("python", "https://www.python.org/ftp/python/{version}/Python-{version}.tar.xz")
            .with_version("3.10.9")
            .with_check(crate::download::extractors::python_version, Some("https://www.python.org/ftp/python/".into()));

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_fetch_text()
            .with(eq("https://www.python.org/ftp/python/"))
            .returning(|_| {
                Ok(r#"<a href="3.10.9/">3.10.9/</a><a href="3.10.10/">3.10.10/</a><a href="bogus/">bogus/</a>"#.to_string())
            });

        let report = d.check_for_newer_version(&fetcher).await.unwrap();
        assert_eq!(report.newer, vec!["3.10.10".to_string()]);
    }
}
