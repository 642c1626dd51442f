//! Sysconfig data rewriting.
//!
//! The interpreter records absolute build paths in its `_sysconfigdata*.py`
//! module. Those paths are replaced with placeholders that the module resolves
//! against its own location when imported, so the values stay valid after the
//! prefix moves.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Placeholder for the install prefix.
pub const BUILDROOT: &str = "{BUILDROOT}";
/// Placeholder for the toolchain root.
pub const TOOLCHAIN: &str = "{TOOLCHAIN}";

const HEADER: &str = "# system configuration generated and used by relbuild at runtime\n";

const TRAILER: &str = r#"

import os as _os
import pathlib as _pathlib
import platform as _platform
import sys as _sys


def _triplet():
    machine = _platform.machine().lower()
    if _sys.platform == "darwin":
        return machine + "-macos"
    if _sys.platform == "win32":
        return machine + "-win"
    return machine + "-linux-gnu"


if "RELBUILD_DATA" in _os.environ:
    _data_dir = _pathlib.Path(_os.environ["RELBUILD_DATA"]).resolve()
elif _sys.platform == "win32":
    _data_dir = _pathlib.Path.home() / "AppData" / "Local" / "relbuild"
else:
    _data_dir = _pathlib.Path.home() / ".local" / "relbuild"

_buildroot = str(_pathlib.Path(__file__).resolve().parent.parent.parent)
_toolchain = str(_data_dir / "toolchain" / _triplet())

build_time_vars = {}
for _key, _val in _build_time_vars.items():
    if isinstance(_val, str):
        _val = _val.replace("{BUILDROOT}", _buildroot).replace("{TOOLCHAIN}", _toolchain)
    build_time_vars[_key] = _val
"#;

static BUILD_TIME_VARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^build_time_vars\s*=").expect("valid build_time_vars regex"));

/// The `lib/python*` directory under `prefix`, if any.
#[must_use]
pub fn find_python_lib(prefix: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(prefix.join("lib"))
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// The `_sysconfigdata*.py` module directly inside `pymodules`.
#[must_use]
pub fn find_sysconfigdata(pymodules: &Path) -> Option<PathBuf> {
    WalkDir::new(pymodules)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .find(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .is_some_and(|n| n.contains("sysconfigdata") && n.ends_with(".py"))
        })
}

/// Rewrites the text of a sysconfig data module. Returns `None` when the
/// module has no `build_time_vars` assignment.
#[must_use]
pub fn rewrite_sysconfigdata(
    source: &str,
    buildroot: &Path,
    toolchain: Option<&Path>,
) -> Option<String> {
    if !BUILD_TIME_VARS.is_match(source) {
        return None;
    }
    let mut body = BUILD_TIME_VARS
        .replace(source, "_build_time_vars =")
        .replace(&buildroot.display().to_string(), BUILDROOT);
    if let Some(toolchain) = toolchain {
        body = body.replace(&toolchain.display().to_string(), TOOLCHAIN);
    }
    let mut out = String::with_capacity(HEADER.len() + body.len() + TRAILER.len());
    out.push_str(HEADER);
    out.push_str(&body);
    out.push_str(TRAILER);
    Some(out)
}

/// Rewrites the module at `path` in place. Returns false when the file did
/// not look like sysconfig data and was left untouched.
pub fn install_sysconfigdata(
    path: &Path,
    buildroot: &Path,
    toolchain: Option<&Path>,
) -> io::Result<bool> {
    let source = std::fs::read_to_string(path)?;
    if source.starts_with(HEADER) {
        info!(path = %path.display(), "Sysconfig data already rewritten");
        return Ok(true);
    }
    match rewrite_sysconfigdata(&source, buildroot, toolchain) {
        Some(rewritten) => {
            std::fs::write(path, rewritten)?;
            info!(path = %path.display(), "Rewrote sysconfig data");
            Ok(true)
        }
        None => {
            warn!(path = %path.display(), "No build_time_vars found in sysconfig data");
            Ok(false)
        }
    }
}
