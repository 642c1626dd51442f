//! # Relbuild
//!
//! Builds an interpreter runtime and its native library dependencies from
//! source and packages the result as a relocatable archive.
//!
//! Relbuild is organised around a small, statically declared graph of build
//! steps:
//!
//! - **Workspace layout**: a fixed set of download, source, build and log
//!   directories shared by every step
//! - **Artifact downloads**: fetched in parallel, verified by checksum and
//!   signature, and required to complete before any step builds
//! - **Dependency-gated scheduling**: every step is spawned eagerly and released
//!   once its dependencies succeed; a failure cancels only the steps that depend
//!   on it
//! - **Packaging**: relocation, configuration rewriting, shebang patching and an
//!   allow-listed `.tar.xz` archive
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relbuild::prelude::*;
//!
//! let config = BuildConfig::from_env("/var/tmp/relbuild", "3.10.9");
//! let mut builder = Builder::new(config)?;
//! builder.add_step("zlib", None, &[], Some(zlib_download))?;
//! builder.add_step("python", None, &["zlib"], Some(python_download))?;
//!
//! let output = builder.run(None).await?;
//! println!("archive: {:?}", output.archive);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod download;
pub mod errors;
pub mod observability;
pub mod packaging;
pub mod pipeline;
pub mod progress;
pub mod recipes;
pub mod testing;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{BuildConfig, FetchConfig};
    pub use crate::core::{Platform, StepOutcome, Triplet};
    pub use crate::download::{
        Checksum, CommandVerifier, Download, DownloadPhase, Fetcher, HttpFetcher,
        SignatureVerifier,
    };
    pub use crate::errors::{BuildError, IntegrityError, Result};
    pub use crate::packaging::{CommandRelocator, Packager, PackagerOptions, Relocator};
    pub use crate::pipeline::{BuildOutput, BuildReport, Builder, Builds, Scheduler};
    pub use crate::progress::{ProgressReporter, SilentProgress, TerminalProgress};
    pub use crate::recipes::{
        BuildAction, BuildEnv, ConfigureMake, FnAction, OpenSslBuild, Recipe, SqliteBuild,
        StepRegistry,
    };
    pub use crate::workspace::{StepDirs, StepLog, WorkDirs};

    #[cfg(feature = "version-check")]
    pub use crate::download::VersionReport;
}
