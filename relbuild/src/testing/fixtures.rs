//! Test fixtures.

use crate::config::BuildConfig;
use crate::core::Triplet;
use crate::workspace::WorkDirs;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch workspace removed on drop.
#[derive(Debug)]
pub struct TestWorkspace {
    /// Directory layout under the scratch root.
    pub work: WorkDirs,
    /// A configuration rooted at the workspace, in CI mode with a short tick
    /// and no cleanup. Its data directory holds an empty toolchain for the
    /// build host.
    pub config: BuildConfig,
    tmp: TempDir,
}

impl TestWorkspace {
    /// Creates a workspace, panicking if the temporary directory cannot be
    /// created.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::try_new().expect("create test workspace")
    }

    /// Creates a workspace.
    pub fn try_new() -> io::Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("root");
        let work = WorkDirs::new(&root);
        work.create()?;
        let data = tmp.path().join("data");
        std::fs::create_dir_all(data.join("toolchain").join(Triplet::build_host().to_string()))?;
        let config = BuildConfig::new(&root, "3.10.9")
            .with_data_dir(data)
            .with_ci(true)
            .with_clean(false)
            .with_cleanup(false)
            .with_poll_interval_ms(10);
        Ok(Self { work, config, tmp })
    }

    /// The scratch directory holding the workspace root and data directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    /// Contents of a step's log, empty if missing.
    #[must_use]
    pub fn log(&self, step: &str) -> String {
        std::fs::read_to_string(self.work.log_file(step)).unwrap_or_default()
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `{dir}/{name}.tar.gz` whose entries live under `{name}/`.
pub fn write_source_archive(dir: &Path, name: &str, files: &[(&str, &str)]) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{name}.tar.gz"));
    let encoder = GzEncoder::new(File::create(&path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (file, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, format!("{name}/{file}"), content.as_bytes())?;
    }
    builder.into_inner()?.finish()?;
    Ok(path)
}
