//! The pluggable build action interface.

use super::env::BuildEnv;
use crate::workspace::{StepDirs, StepLog};
use anyhow::Context;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;

/// Capability that performs the actual compilation of one step.
///
/// Output belongs in `log`. Any error returned (or panic raised) is written to
/// the log and turns into a failed step.
#[async_trait]
pub trait BuildAction: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Runs the action.
    async fn execute(&self, env: &BuildEnv, dirs: &StepDirs, log: &StepLog) -> anyhow::Result<()>;
}

type ActionFn = dyn Fn(&BuildEnv, &StepDirs, &StepLog) -> anyhow::Result<()> + Send + Sync;

/// Build action backed by a synchronous closure.
///
/// The closure runs on the blocking thread pool so that independent steps
/// build concurrently and the orchestrator keeps ticking. A panic inside it
/// is re-raised on the calling task.
#[derive(Clone)]
pub struct FnAction {
    name: String,
    func: Arc<ActionFn>,
}

impl FnAction {
    /// Wraps a closure.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&BuildEnv, &StepDirs, &StepLog) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

#[async_trait]
impl BuildAction for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, env: &BuildEnv, dirs: &StepDirs, log: &StepLog) -> anyhow::Result<()> {
        let func = Arc::clone(&self.func);
        let (env, dirs, log) = (env.clone(), dirs.clone(), log.try_clone()?);
        match tokio::task::spawn_blocking(move || func(&env, &dirs, &log)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(anyhow::anyhow!("build action '{}' did not complete: {e}", self.name)),
        }
    }
}

/// Runs a command with exactly `env`, in `cwd`, with stdout and stderr
/// appended to `log`. A non-zero exit is an error.
///
/// The child is killed if the returned future is dropped.
pub async fn run_logged<I, S>(
    program: &str,
    args: I,
    env: &BuildEnv,
    cwd: &Path,
    log: &StepLog,
) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<S> = args.into_iter().collect();
    let rendered: Vec<String> = args
        .iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect();
    log.write_line(format!("$ {program} {}", rendered.join(" ")))?;

    let status = Command::new(program)
        .args(&args)
        .env_clear()
        .envs(env.iter())
        .current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .stdout(log.stdio()?)
        .stderr(log.stdio()?)
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("failed to spawn {program}"))?;

    if !status.success() {
        anyhow::bail!("{program} exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Platform, Triplet};
    use crate::workspace::WorkDirs;

    fn setup(tmp: &Path) -> (StepDirs, StepLog) {
        let work = WorkDirs::new(tmp);
        work.create().unwrap();
        let dirs = StepDirs::new(
            &work,
            "demo",
            "3.10.9",
            &Triplet::new("x86_64", Platform::Linux),
            tmp.join("scratch"),
            None,
        );
        let log = StepLog::create(dirs.log_path()).unwrap();
        (dirs, log)
    }

    #[tokio::test]
    async fn test_fn_action_runs_closure() {
        let tmp = tempfile::tempdir().unwrap();
        let (dirs, log) = setup(tmp.path());
        let action = FnAction::new("demo", |env, _dirs, log| {
            log.write_line(format!("host={}", env.get("RELBUILD_HOST").unwrap_or("?")))?;
            Ok(())
        });
        let env = BuildEnv::new().with("RELBUILD_HOST", "x86_64-linux-gnu");
        action.execute(&env, &dirs, &log).await.unwrap();
        assert_eq!(action.name(), "demo");
        let text = std::fs::read_to_string(dirs.log_path()).unwrap();
        assert!(text.contains("host=x86_64-linux-gnu"));
    }

    #[tokio::test]
    async fn test_fn_action_does_not_block_the_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let (dirs, log) = setup(tmp.path());
        let action = FnAction::new("sleepy", |_, _, _| {
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(())
        });
        let env = BuildEnv::new();
        let ticker = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            std::time::Instant::now()
        });
        action.execute(&env, &dirs, &log).await.unwrap();
        let finished = std::time::Instant::now();
        assert!(ticker.await.unwrap() < finished);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_logged_captures_output_and_env() {
        let tmp = tempfile::tempdir().unwrap();
        let (dirs, log) = setup(tmp.path());
        let env = BuildEnv::new()
            .with("PATH", "/usr/bin:/bin")
            .with("RELBUILD_HOST", "x86_64-linux-gnu");

        run_logged(
            "/bin/sh",
            ["-c", "echo host=$RELBUILD_HOST; echo home=${HOME:-unset} 1>&2"],
            &env,
            tmp.path(),
            &log,
        )
        .await
        .unwrap();

        let text = std::fs::read_to_string(dirs.log_path()).unwrap();
        assert!(text.contains("host=x86_64-linux-gnu"));
        assert!(text.contains("home=unset"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_logged_nonzero_exit_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (_dirs, log) = setup(tmp.path());
        let err = run_logged("/bin/sh", ["-c", "exit 3"], &BuildEnv::new(), tmp.path(), &log)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
