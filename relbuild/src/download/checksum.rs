//! Content checksums for downloaded archives.

use crate::errors::{IntegrityError, Result};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// An expected content hash, as lowercase or uppercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "digest", rename_all = "lowercase")]
pub enum Checksum {
    /// MD5 digest.
    Md5(String),
    /// SHA-256 digest.
    Sha256(String),
}

impl Checksum {
    /// Algorithm name.
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Md5(_) => "md5",
            Self::Sha256(_) => "sha256",
        }
    }

    /// The configured digest.
    #[must_use]
    pub fn expected(&self) -> &str {
        match self {
            Self::Md5(hex) | Self::Sha256(hex) => hex,
        }
    }

    /// Computes this algorithm's digest of a file.
    pub fn compute(&self, path: &Path) -> io::Result<String> {
        match self {
            Self::Md5(_) => digest_file::<Md5>(path),
            Self::Sha256(_) => digest_file::<Sha256>(path),
        }
    }

    /// Whether the file's digest equals the configured one.
    pub fn matches(&self, path: &Path) -> io::Result<bool> {
        Ok(self.compute(path)?.eq_ignore_ascii_case(self.expected()))
    }

    /// Fails with [`IntegrityError::ChecksumMismatch`] unless the file matches.
    pub fn verify(&self, path: &Path) -> Result<()> {
        let actual = self.compute(path)?;
        if actual.eq_ignore_ascii_case(self.expected()) {
            return Ok(());
        }
        Err(IntegrityError::ChecksumMismatch {
            path: path.to_path_buf(),
            algorithm: self.algorithm().to_string(),
            expected: self.expected().to_string(),
            actual,
        }
        .into())
    }
}

fn digest_file<D: Digest>(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BuildError;

    const MD5_HELLO: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const SHA256_HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn hello(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("hello.txt");
        std::fs::write(&path, "hello world").unwrap();
        path
    }

    #[test]
    fn test_compute_known_digests() {
        let tmp = tempfile::tempdir().unwrap();
        let path = hello(tmp.path());
        assert_eq!(Checksum::Md5(String::new()).compute(&path).unwrap(), MD5_HELLO);
        assert_eq!(Checksum::Sha256(String::new()).compute(&path).unwrap(), SHA256_HELLO);
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        let path = hello(tmp.path());
        assert!(Checksum::Md5(MD5_HELLO.to_uppercase()).matches(&path).unwrap());
    }

    #[test]
    fn test_verify_mismatch_fails_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = hello(tmp.path());
        let err = Checksum::Sha256("00".repeat(32)).verify(&path).unwrap_err();
        match err {
            BuildError::Integrity(IntegrityError::ChecksumMismatch { algorithm, actual, .. }) => {
                assert_eq!(algorithm, "sha256");
                assert_eq!(actual, SHA256_HELLO);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Checksum::Md5("ab".into())).unwrap();
        assert_eq!(json, serde_json::json!({"algorithm": "md5", "digest": "ab"}));
    }
}
