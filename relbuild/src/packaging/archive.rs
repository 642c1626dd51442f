//! Allow-listed `.tar.xz` packaging of an install prefix.

use crate::errors::{BuildError, Result};
use glob::{MatchOptions, Pattern};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use xz2::write::XzEncoder;

/// Files that make it into the final archive.
pub const DEFAULT_ARCHIVE_GLOBS: &[&str] = &[
    "/bin/python*",
    "/bin/pip*",
    "/bin/relbuild",
    "/lib/python*/ensurepip/*",
    "/lib/python*/site-packages/*",
    "/include/*",
    "*.so",
    "/lib/*.so.*",
    "*.a",
    "*.py",
    "*.dylib",
];

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled fnmatch-style patterns matched against `/{relative path}`.
/// `*` crosses directory separators.
#[derive(Debug, Clone)]
pub struct ArchiveAllowList {
    patterns: Vec<Pattern>,
}

impl ArchiveAllowList {
    /// Compiles the patterns.
    pub fn new<I, S>(globs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = globs
            .into_iter()
            .map(|g| {
                Pattern::new(g.as_ref())
                    .map_err(|e| BuildError::Validation(format!("bad archive glob '{}': {e}", g.as_ref())))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// The default allow-list.
    pub fn default_globs() -> Result<Self> {
        Self::new(DEFAULT_ARCHIVE_GLOBS)
    }

    /// Whether a path relative to the prefix is archived.
    #[must_use]
    pub fn allows(&self, relative: &Path) -> bool {
        let rooted = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
        self.patterns.iter().any(|p| p.matches_with(&rooted, MATCH))
    }
}

/// Non-directory entries under `prefix` accepted by `allow`, as relative
/// paths in sorted order.
pub fn select_members(prefix: &Path, allow: &ArchiveAllowList) -> Result<Vec<PathBuf>> {
    let mut members = Vec::new();
    for entry in WalkDir::new(prefix).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| BuildError::Archive(e.to_string()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(prefix)
            .map_err(|e| BuildError::Archive(e.to_string()))?
            .to_path_buf();
        if allow.allows(&relative) {
            debug!(path = %relative.display(), "Adding");
            members.push(relative);
        } else {
            debug!(path = %relative.display(), "Skipping");
        }
    }
    Ok(members)
}

/// Writes the allowed contents of `prefix` to an xz-compressed tarball at
/// `dest`. Symlinks are stored as links. Returns the number of members.
pub fn create_archive(prefix: &Path, dest: &Path, allow: &ArchiveAllowList) -> Result<usize> {
    info!(prefix = %prefix.display(), archive = %dest.display(), "Creating archive");
    let members = select_members(prefix, allow)?;
    let file = BufWriter::new(File::create(dest)?);
    let mut builder = tar::Builder::new(XzEncoder::new(file, 6));
    builder.follow_symlinks(false);
    for relative in &members {
        builder
            .append_path_with_name(prefix.join(relative), relative)
            .map_err(|e| BuildError::Archive(format!("{}: {e}", relative.display())))?;
    }
    let encoder = builder
        .into_inner()
        .map_err(|e| BuildError::Archive(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| BuildError::Archive(e.to_string()))?
        .flush()?;
    info!(members = members.len(), archive = %dest.display(), "Archive written");
    Ok(members.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use xz2::read::XzDecoder;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, rel).unwrap();
    }

    #[test]
    fn test_star_crosses_directories() {
        let allow = ArchiveAllowList::new(["*.so", "/bin/python*"]).unwrap();
        assert!(allow.allows(Path::new("lib/x.so")));
        assert!(allow.allows(Path::new("lib/python3.10/lib-dynload/_ssl.so")));
        assert!(allow.allows(Path::new("bin/python3")));
        assert!(!allow.allows(Path::new("lib/x.o")));
        assert!(!allow.allows(Path::new("share/bin/python3")));
    }

    #[test]
    fn test_default_globs() {
        let allow = ArchiveAllowList::default_globs().unwrap();
        assert!(allow.allows(Path::new("lib/python3.10/site-packages/pip/__init__.py")));
        assert!(allow.allows(Path::new("lib/libssl.so.3")));
        assert!(allow.allows(Path::new("include/python3.10/Python.h")));
        assert!(!allow.allows(Path::new("share/man/man1/python3.1")));
    }

    #[test]
    fn test_bad_glob_rejected() {
        assert!(ArchiveAllowList::new(["[unclosed"]).is_err());
    }

    #[test]
    fn test_archive_contains_only_allowed_members() {
        let tmp = tempfile::tempdir().unwrap();
        let prefix = tmp.path().join("3.10.9-x86_64-linux-gnu");
        touch(&prefix, "lib/x.so");
        touch(&prefix, "bin/python3");
        touch(&prefix, "lib/x.o");

        let dest = tmp.path().join("3.10.9-x86_64-linux-gnu.tar.xz");
        let allow = ArchiveAllowList::new(["*.so", "/bin/python*"]).unwrap();
        assert_eq!(create_archive(&prefix, &dest, &allow).unwrap(), 2);

        let mut archive = tar::Archive::new(XzDecoder::new(File::open(&dest).unwrap()));
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().display().to_string();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            assert_eq!(body, name);
            names.push(name);
        }
        assert_eq!(names, vec!["bin/python3".to_string(), "lib/x.so".to_string()]);
    }
}
