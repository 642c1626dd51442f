//! Step log files.

use crate::recipes::BuildEnv;
use crate::workspace::StepDirs;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Separator line written around the log header sections.
pub const BANNER: &str =
    "********************************************************************************";

/// An open, step-specific log file.
///
/// Build action output is redirected here. The handle is released when the
/// `StepLog` is dropped.
#[derive(Debug)]
pub struct StepLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl StepLog {
    /// Creates (truncating) the log at `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a line.
    pub fn write_line(&self, line: impl AsRef<str>) -> io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(line.as_ref().as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()
    }

    /// Writes the directory layout and environment ahead of the build action.
    pub fn write_header(&self, dirs: &StepDirs, env: &BuildEnv) -> io::Result<()> {
        self.write_line(BANNER)?;
        for (key, value) in dirs.to_map() {
            self.write_line(format!("{key} {value}"))?;
        }
        self.write_line(BANNER)?;
        for (key, value) in env.iter() {
            self.write_line(format!("{key} {value}"))?;
        }
        self.write_line(BANNER)
    }

    /// A second handle onto the same open log, for writers on other threads.
    pub fn try_clone(&self) -> io::Result<Self> {
        let file = self.file.lock().try_clone()?;
        Ok(Self {
            path: self.path.clone(),
            file: Mutex::new(file),
        })
    }

    /// A handle suitable for a child process's stdout or stderr.
    pub fn stdio(&self) -> io::Result<Stdio> {
        let file = self.file.lock().try_clone()?;
        Ok(Stdio::from(file))
    }
}

/// Reads at most the last `max_bytes` bytes of a log.
pub fn read_log_tail(path: &Path, max_bytes: u64) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(max_bytes);
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity(usize::try_from(len - start).unwrap_or(0));
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Platform, Triplet};
    use crate::workspace::WorkDirs;

    #[test]
    fn test_header_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let work = WorkDirs::new(tmp.path());
        let dirs = StepDirs::new(
            &work,
            "zlib",
            "3.10.9",
            &Triplet::new("x86_64", Platform::Linux),
            tmp.path().join("scratch"),
            None,
        );
        let env = BuildEnv::new().with("RELBUILD_HOST", "x86_64-linux-gnu");

        let log = StepLog::create(work.log_file("zlib")).unwrap();
        log.write_header(&dirs, &env).unwrap();
        log.write_line("configure output").unwrap();
        drop(log);

        let text = std::fs::read_to_string(work.log_file("zlib")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], BANNER);
        assert!(text.contains(&format!("prefix {}", dirs.prefix.display())));
        assert!(text.contains("RELBUILD_HOST x86_64-linux-gnu"));
        assert_eq!(lines.iter().filter(|l| **l == BANNER).count(), 3);
        assert_eq!(*lines.last().unwrap(), "configure output");
    }

    #[test]
    fn test_tail_is_bounded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("big.log");
        let mut content = "x".repeat(10_000);
        content.push_str("THE END");
        std::fs::write(&path, &content).unwrap();

        let tail = read_log_tail(&path, 4096).unwrap();
        assert_eq!(tail.len(), 4096);
        assert!(tail.ends_with("THE END"));
    }

    #[test]
    fn test_tail_of_short_log_is_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("short.log");
        std::fs::write(&path, "boom\n").unwrap();
        assert_eq!(read_log_tail(&path, 4096).unwrap(), "boom\n");
    }

    #[test]
    fn test_tail_of_missing_log_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_log_tail(&tmp.path().join("nope.log"), 10).is_err());
    }
}
