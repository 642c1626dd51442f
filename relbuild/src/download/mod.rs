//! Artifact download and verification.
//!
//! This module provides:
//! - [`Download`] descriptors with fallback URLs, signatures and checksums
//! - The [`Fetcher`] transport protocol and its `reqwest` implementation
//! - The [`DownloadPhase`] runner that gates the build on every download
//! - Newer-version discovery from listing pages (`version-check` feature)

mod artifact;
mod checksum;
pub mod extractors;
pub(crate) mod fetcher;
mod phase;
pub(crate) mod signature;
#[cfg(feature = "version-check")]
mod version;

pub use artifact::{Download, FetchOutcome, VersionExtractor};
pub use checksum::Checksum;
pub use fetcher::{Fetcher, HttpFetcher};
pub use phase::{DownloadPhase, DownloadSummary};
pub use signature::{CommandVerifier, SignatureVerifier};
#[cfg(feature = "version-check")]
pub use version::{compare_versions, parse_links, LooseVersion, ReleaseVersion, VersionReport};
