//! The explicit environment handed to build actions.

use crate::core::Triplet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Prefix of every variable relbuild sets for build actions.
pub const ENV_PREFIX: &str = "RELBUILD_";

/// An immutable-by-convention map of environment variables.
///
/// Child processes of a build action receive exactly these variables; the
/// caller's environment is not inherited except through
/// [`BuildEnv::with_passthrough`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnv {
    vars: BTreeMap<String, String>,
}

impl BuildEnv {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The variables describing a target build.
    #[must_use]
    pub fn for_target(host: &Triplet, build: &Triplet, py_version: &str) -> Self {
        Self::new()
            .with("RELBUILD_DEBUG", "1")
            .with("RELBUILD_HOST", host.to_string())
            .with("RELBUILD_HOST_ARCH", host.arch())
            .with("RELBUILD_BUILD", build.to_string())
            .with("RELBUILD_BUILD_ARCH", build.arch())
            .with("RELBUILD_PY_VERSION", py_version)
            .with("RELBUILD_PY_MAJOR_VERSION", major_version(py_version))
    }

    /// Sets a variable.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Sets a path variable when the path is present.
    #[must_use]
    pub fn with_path(self, key: &str, path: Option<&Path>) -> Self {
        match path {
            Some(path) => self.with(key, path.display().to_string()),
            None => self,
        }
    }

    /// Copies the named variables from the caller's environment when set.
    #[must_use]
    pub fn with_passthrough(mut self, names: &[String]) -> Self {
        for name in names {
            if let Ok(value) = std::env::var(name) {
                self.vars.insert(name.clone(), value);
            }
        }
        self
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Whether the target is a Linux triplet.
    #[must_use]
    pub fn host_is_linux(&self) -> bool {
        self.get("RELBUILD_HOST").is_some_and(|h| h.contains("linux"))
    }

    /// Whether host and build architectures differ.
    #[must_use]
    pub fn is_cross(&self) -> bool {
        self.get("RELBUILD_HOST_ARCH") != self.get("RELBUILD_BUILD_ARCH")
    }

    /// Iterates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// `3.10.9` → `3.10`.
#[must_use]
pub fn major_version(version: &str) -> &str {
    version.rsplit_once('.').map_or(version, |(major, _)| major)
}
