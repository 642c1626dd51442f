//! Build configuration.
//!
//! A `BuildConfig` is constructed once per build (architecture x version) and
//! passed by value into every component. Nothing here mutates the process
//! environment.

use crate::errors::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "RELBUILD_DATA";

/// Configuration for HTTP fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout() -> f64 {
    600.0
}

fn default_user_agent() -> String {
    concat!("relbuild/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

/// Configuration for a single build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Root of the working directories.
    pub root: PathBuf,
    /// Location of toolchains and the native interpreter.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Target architecture.
    #[serde(default = "default_arch")]
    pub arch: String,
    /// Pinned interpreter version.
    pub version: String,
    /// Re-download archives even when a valid cached copy exists.
    #[serde(default)]
    pub force_download: bool,
    /// Remove the prefix and source area before building.
    #[serde(default = "default_true")]
    pub clean: bool,
    /// Remove the prefix after the build, keeping only the archive.
    #[serde(default = "default_true")]
    pub cleanup: bool,
    /// Running under CI; disables the live progress line.
    #[serde(default)]
    pub ci: bool,
    /// Orchestrator tick interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Bytes of each failing step's log surfaced in the failure summary.
    #[serde(default = "default_log_tail_bytes")]
    pub log_tail_bytes: u64,
    /// External signature verification program.
    #[serde(default = "default_signature_tool")]
    pub signature_tool: String,
    /// Parallel jobs passed to make.
    #[serde(default = "default_make_jobs")]
    pub make_jobs: usize,
    /// Caller environment variables inherited by build actions.
    #[serde(default = "default_env_passthrough")]
    pub env_passthrough: Vec<String>,
    /// HTTP settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

fn default_true() -> bool {
    true
}

fn default_arch() -> String {
    std::env::consts::ARCH.to_string()
}

fn default_data_dir() -> PathBuf {
    let base = if cfg!(windows) {
        dirs::data_local_dir()
    } else {
        dirs::home_dir().map(|home| home.join(".local"))
    };
    base.unwrap_or_else(std::env::temp_dir).join("relbuild")
}

fn default_poll_interval_ms() -> u64 {
    300
}

fn default_log_tail_bytes() -> u64 {
    4096
}

fn default_signature_tool() -> String {
    "gpg".to_string()
}

fn default_make_jobs() -> usize {
    8
}

fn default_env_passthrough() -> Vec<String> {
    vec!["PATH".to_string()]
}

impl BuildConfig {
    /// Creates a configuration for the build host's architecture.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            data_dir: default_data_dir(),
            arch: default_arch(),
            version: version.into(),
            force_download: false,
            clean: true,
            cleanup: true,
            ci: false,
            poll_interval_ms: default_poll_interval_ms(),
            log_tail_bytes: default_log_tail_bytes(),
            signature_tool: default_signature_tool(),
            make_jobs: default_make_jobs(),
            env_passthrough: default_env_passthrough(),
            fetch: FetchConfig::default(),
        }
    }

    /// Creates a configuration honouring `RELBUILD_DATA` and `CI`.
    #[must_use]
    pub fn from_env(root: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        let mut config = Self::new(root, version);
        if let Some(data) = std::env::var_os(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(data);
        }
        config.ci = std::env::var_os("CI").is_some();
        config
    }

    /// Parses a configuration from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| BuildError::Validation(e.to_string()))
    }

    /// Sets the target architecture.
    #[must_use]
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Forces downloads.
    #[must_use]
    pub fn with_force_download(mut self, force: bool) -> Self {
        self.force_download = force;
        self
    }

    /// Sets pre-build cleaning.
    #[must_use]
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Sets post-build cleanup.
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Sets CI mode.
    #[must_use]
    pub fn with_ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }

    /// Sets the orchestrator tick interval.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Sets the failure log tail window.
    #[must_use]
    pub fn with_log_tail_bytes(mut self, bytes: u64) -> Self {
        self.log_tail_bytes = bytes;
        self
    }

    /// Sets the signature verification program.
    #[must_use]
    pub fn with_signature_tool(mut self, tool: impl Into<String>) -> Self {
        self.signature_tool = tool.into();
        self
    }

    /// Sets make parallelism.
    #[must_use]
    pub fn with_make_jobs(mut self, jobs: usize) -> Self {
        self.make_jobs = jobs;
        self
    }

    /// Gets the tick interval as Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Directory holding per-triplet toolchains.
    #[must_use]
    pub fn toolchain_root(&self) -> PathBuf {
        self.data_dir.join("toolchain")
    }

    /// Root of the natively built interpreter used for cross builds.
    #[must_use]
    pub fn native_root(&self) -> PathBuf {
        self.data_dir.join("native")
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(BuildError::Validation("version cannot be empty".into()));
        }
        if self.arch.trim().is_empty() {
            return Err(BuildError::Validation("arch cannot be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(BuildError::Validation(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.make_jobs == 0 {
            return Err(BuildError::Validation("make jobs must be at least 1".into()));
        }
        Ok(())
    }
}
