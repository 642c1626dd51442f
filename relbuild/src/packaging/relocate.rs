//! Relocation of the installed prefix.

use crate::recipes::{run_logged, BuildEnv};
use crate::workspace::StepLog;
use async_trait::async_trait;
use std::path::Path;

/// Rewrites run-time search paths of the binaries under a prefix so the
/// installation works from any location.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Relocator: Send + Sync {
    /// Relocates everything under `prefix`, writing tool output to `log`.
    async fn relocate(&self, prefix: &Path, log: &StepLog) -> anyhow::Result<()>;
}

/// Relocator backed by an external program invoked as
/// `{program} {args...} {prefix}`.
#[derive(Debug, Clone)]
pub struct CommandRelocator {
    program: String,
    args: Vec<String>,
    passthrough: Vec<String>,
}

impl CommandRelocator {
    /// Creates a relocator running `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            passthrough: vec!["PATH".to_string()],
        }
    }

    /// Arguments placed before the prefix.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The full argument list for `prefix`.
    #[must_use]
    pub fn command_args(&self, prefix: &Path) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(prefix.display().to_string());
        args
    }
}

#[async_trait]
impl Relocator for CommandRelocator {
    async fn relocate(&self, prefix: &Path, log: &StepLog) -> anyhow::Result<()> {
        let env = BuildEnv::new().with_passthrough(&self.passthrough);
        run_logged(&self.program, self.command_args(prefix), &env, prefix, log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_last_argument() {
        let relocator = CommandRelocator::new("relok8").with_args(["--root"]);
        assert_eq!(
            relocator.command_args(Path::new("/w/build/3.10.9-x86_64-linux-gnu")),
            vec!["--root".to_string(), "/w/build/3.10.9-x86_64-linux-gnu".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let log = StepLog::create(tmp.path().join("finalize.log")).unwrap();
        let err = CommandRelocator::new("false")
            .relocate(tmp.path(), &log)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("false"));
    }
}
