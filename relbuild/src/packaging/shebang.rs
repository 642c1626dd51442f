//! Shebang rewriting.

use std::io;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A `/bin/sh` and Python polyglot header that re-executes the script with
/// the interpreter at `target`, resolved relative to the script's own
/// directory.
#[must_use]
pub fn relative_shebang(target: &str) -> String {
    format!(
        "#!/bin/sh\n\"true\" ''''\n\"exec\" \"$(dirname \"$(readlink -f \"$0\")\")/{target}\" \"$0\" \"$@\"\n'''\n"
    )
}

/// Replaces the first line of `path` when that line is exactly `old`.
/// Returns whether the file was patched; a missing file is not an error.
pub fn patch_shebang(path: &Path, old: &str, new: &str) -> io::Result<bool> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No file to patch");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    let rest = match data.strip_prefix(old.as_bytes()) {
        Some(rest) if rest.is_empty() || rest.starts_with(b"\n") || rest.starts_with(b"\r\n") => rest,
        _ => {
            debug!(path = %path.display(), expected = %old, "Shebang doesn't match");
            return Ok(false);
        }
    };
    let rest = rest
        .strip_prefix(b"\r\n")
        .or_else(|| rest.strip_prefix(b"\n"))
        .unwrap_or(rest);
    let mut patched = Vec::with_capacity(new.len() + rest.len());
    patched.extend_from_slice(new.as_bytes());
    patched.extend_from_slice(rest);
    std::fs::write(path, patched)?;
    info!(path = %path.display(), "Patched shebang");
    Ok(true)
}

/// Patches every file under `dir`. Returns the number of files patched;
/// files that cannot be read are skipped with a warning.
pub fn patch_shebangs(dir: &Path, old: &str, new: &str) -> usize {
    let mut patched = 0;
    for entry in WalkDir::new(dir).sort_by_file_name().into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        match patch_shebang(entry.path(), old, new) {
            Ok(true) => patched += 1,
            Ok(false) => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Unable to patch shebang"),
        }
    }
    patched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_shebang_is_sh_polyglot() {
        let shebang = relative_shebang("python3");
        assert!(shebang.starts_with("#!/bin/sh\n"));
        assert!(shebang.contains("\")/python3\" \"$0\" \"$@\""));
        assert!(shebang.ends_with("'''\n"));
    }

    #[test]
    fn test_full_version_patched_before_major() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let full = format!("#!{}", bin.join("python3.10").display());
        let major = format!("#!{}", bin.join("python3").display());
        std::fs::write(bin.join("pip3.10"), format!("{full}\nimport pip\n")).unwrap();
        std::fs::write(bin.join("idle3"), format!("{major}\nimport idlelib\n")).unwrap();
        std::fs::write(bin.join("python3.10"), b"\x7fELF\x02\x01").unwrap();

        let new = relative_shebang("python3");
        assert_eq!(patch_shebangs(&bin, &full, &new), 1);
        assert_eq!(patch_shebangs(&bin, &major, &new), 1);

        let pip = std::fs::read_to_string(bin.join("pip3.10")).unwrap();
        assert_eq!(pip, format!("{new}import pip\n"));
        let idle = std::fs::read_to_string(bin.join("idle3")).unwrap();
        assert_eq!(idle, format!("{new}import idlelib\n"));
        assert_eq!(std::fs::read(bin.join("python3.10")).unwrap(), b"\x7fELF\x02\x01");
    }

    #[test]
    fn test_longer_interpreter_name_not_matched() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("pydoc3.10");
        std::fs::write(&script, "#!/opt/bin/python3.10\n").unwrap();
        assert!(!patch_shebang(&script, "#!/opt/bin/python3", "#!x\n").unwrap());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!patch_shebang(&tmp.path().join("cgi.py"), "#! /usr/local/bin/python", "#!x").unwrap());
    }
}
