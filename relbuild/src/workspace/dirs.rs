//! Directory layout for a build and for each step.

use crate::core::Triplet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// The fixed layout shared by all steps of a build.
///
/// ```text
/// {root}/download/*
/// {root}/src/{step}/...
/// {root}/build/{version}-{triplet}/...
/// {root}/logs/{step}.log
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDirs {
    /// Workspace root.
    pub root: PathBuf,
    /// Download cache.
    pub download: PathBuf,
    /// Source extraction root.
    pub src: PathBuf,
    /// Build root holding install prefixes.
    pub build: PathBuf,
    /// Log directory.
    pub logs: PathBuf,
}

impl WorkDirs {
    /// Resolves the layout under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            download: root.join("download"),
            src: root.join("src"),
            build: root.join("build"),
            logs: root.join("logs"),
            root,
        }
    }

    /// Creates every directory of the layout. Existing directories are reused.
    pub fn create(&self) -> io::Result<()> {
        for dir in [&self.root, &self.download, &self.src, &self.build, &self.logs] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Install prefix for a version and target. Version and triplet keep
    /// concurrent builds from colliding.
    #[must_use]
    pub fn prefix(&self, version: &str, triplet: &Triplet) -> PathBuf {
        self.build.join(format!("{version}-{triplet}"))
    }

    /// Log file of a step.
    #[must_use]
    pub fn log_file(&self, step: &str) -> PathBuf {
        self.logs.join(format!("{step}.log"))
    }
}

/// Directories visible to one step's build action.
///
/// A plain value: it is re-derived per worker from the shared layout and
/// never shared mutably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDirs {
    /// Step name.
    pub name: String,
    /// Interpreter version being built.
    pub version: String,
    /// Target triplet.
    pub triplet: Triplet,
    /// Workspace root.
    pub root: PathBuf,
    /// Build root.
    pub build: PathBuf,
    /// Download cache.
    pub downloads: PathBuf,
    /// Log directory.
    pub logs: PathBuf,
    /// Source extraction root.
    pub sources: PathBuf,
    /// Install prefix.
    pub prefix: PathBuf,
    /// Step-private scratch directory.
    pub tmpbuild: PathBuf,
    /// Extracted source tree, when the step has a download.
    pub source: Option<PathBuf>,
    /// Toolchain root for the target, when one is managed.
    pub toolchain: Option<PathBuf>,
}

impl StepDirs {
    /// Derives the directories for `name` from the shared layout.
    #[must_use]
    pub fn new(
        work: &WorkDirs,
        name: impl Into<String>,
        version: impl Into<String>,
        triplet: &Triplet,
        tmpbuild: impl Into<PathBuf>,
        toolchain: Option<PathBuf>,
    ) -> Self {
        let version = version.into();
        Self {
            name: name.into(),
            prefix: work.prefix(&version, triplet),
            version,
            triplet: triplet.clone(),
            root: work.root.clone(),
            build: work.build.clone(),
            downloads: work.download.clone(),
            logs: work.logs.clone(),
            sources: work.src.clone(),
            tmpbuild: tmpbuild.into(),
            source: None,
            toolchain,
        }
    }

    /// Sets the extracted source directory.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Directory build commands run in: the source tree when present,
    /// otherwise the prefix.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        self.source.as_deref().unwrap_or(&self.prefix)
    }

    /// This step's log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.logs.join(format!("{}.log", self.name))
    }

    /// Layout as ordered key/value pairs for the step log header.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        map.insert("root", self.root.display().to_string());
        map.insert("prefix", self.prefix.display().to_string());
        map.insert("downloads", self.downloads.display().to_string());
        map.insert("logs", self.logs.display().to_string());
        map.insert("sources", self.sources.display().to_string());
        map.insert("build", self.build.display().to_string());
        map.insert("tmpbuild", self.tmpbuild.display().to_string());
        if let Some(ref source) = self.source {
            map.insert("source", source.display().to_string());
        }
        if let Some(ref toolchain) = self.toolchain {
            map.insert("toolchain", toolchain.display().to_string());
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Platform;

    fn triplet() -> Triplet {
        Triplet::new("x86_64", Platform::Linux)
    }

    #[test]
    fn test_layout() {
        let work = WorkDirs::new("/w");
        assert_eq!(work.download, PathBuf::from("/w/download"));
        assert_eq!(work.src, PathBuf::from("/w/src"));
        assert_eq!(work.build, PathBuf::from("/w/build"));
        assert_eq!(work.log_file("zlib"), PathBuf::from("/w/logs/zlib.log"));
    }

    #[test]
    fn test_prefix_embeds_version_and_triplet() {
        let work = WorkDirs::new("/w");
        let a = work.prefix("3.10.9", &triplet());
        let b = work.prefix("3.11.4", &triplet());
        let c = work.prefix("3.10.9", &Triplet::new("aarch64", Platform::Linux));
        assert_eq!(a, PathBuf::from("/w/build/3.10.9-x86_64-linux-gnu"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_create_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let work = WorkDirs::new(tmp.path().join("root"));
        work.create().unwrap();
        work.create().unwrap();
        assert!(work.logs.is_dir());
        assert!(work.download.is_dir());
    }

    #[test]
    fn test_step_dirs_workdir() {
        let work = WorkDirs::new("/w");
        let dirs = StepDirs::new(&work, "zlib", "3.10.9", &triplet(), "/tmp/zlib_build", None);
        assert_eq!(dirs.workdir(), dirs.prefix.as_path());
        assert_eq!(dirs.log_path(), PathBuf::from("/w/logs/zlib.log"));

        let dirs = dirs.with_source("/w/src/zlib-1.3");
        assert_eq!(dirs.workdir(), Path::new("/w/src/zlib-1.3"));
        assert_eq!(dirs.to_map()["source"], "/w/src/zlib-1.3");
    }
}
