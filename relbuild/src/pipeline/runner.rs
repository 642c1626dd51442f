//! Per-step execution.

use super::gate::GateWaiter;
use crate::core::Triplet;
use crate::errors::{BuildError, Result};
use crate::observability::StepTimer;
use crate::recipes::{BuildAction, BuildEnv};
use crate::workspace::{extract_archive, source_dir_name, StepDirs, StepLog, WorkDirs};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hook that adjusts a step's environment after the standard variables are set.
pub type EnvHook = Arc<dyn Fn(&mut BuildEnv, &StepDirs) + Send + Sync>;

/// Immutable description of a build shared by every step runner.
#[derive(Clone)]
pub struct BuildPlan {
    /// Workspace layout.
    pub work: WorkDirs,
    /// Interpreter version.
    pub version: String,
    /// Target triplet.
    pub triplet: Triplet,
    /// Triplet of the machine running the build.
    pub build_triplet: Triplet,
    /// Managed toolchain root, when the target has one.
    pub toolchain: Option<PathBuf>,
    /// Data directory exported to build actions.
    pub data_dir: Option<PathBuf>,
    /// Natively built interpreter, for cross builds.
    pub native_python: Option<PathBuf>,
    /// Caller variables inherited by build actions.
    pub passthrough: Vec<String>,
    /// Optional environment adjustment.
    pub env_hook: Option<EnvHook>,
}

impl std::fmt::Debug for BuildPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPlan")
            .field("work", &self.work)
            .field("version", &self.version)
            .field("triplet", &self.triplet)
            .field("toolchain", &self.toolchain)
            .finish_non_exhaustive()
    }
}

impl BuildPlan {
    /// A plan for building natively on this machine.
    #[must_use]
    pub fn native(work: WorkDirs, version: impl Into<String>) -> Self {
        let triplet = Triplet::build_host();
        Self {
            work,
            version: version.into(),
            build_triplet: triplet.clone(),
            triplet,
            toolchain: None,
            data_dir: None,
            native_python: None,
            passthrough: vec!["PATH".to_string()],
            env_hook: None,
        }
    }

    /// The environment for one step.
    #[must_use]
    pub fn step_env(&self, dirs: &StepDirs) -> BuildEnv {
        let mut env = BuildEnv::for_target(&self.triplet, &self.build_triplet, &self.version)
            .with_path("RELBUILD_TOOLCHAIN", self.toolchain.as_deref())
            .with_path("RELBUILD_DATA", self.data_dir.as_deref())
            .with_path("RELBUILD_NATIVE_PY", self.native_python.as_deref())
            .with_passthrough(&self.passthrough);
        if let Some(ref hook) = self.env_hook {
            hook(&mut env, dirs);
        }
        env
    }
}

/// Runs one step: waits for its gate, prepares directories, extracts the
/// source archive and invokes the build action with output captured in the
/// step log.
#[derive(Debug, Clone)]
pub struct StepRunner {
    name: String,
    action: Arc<dyn BuildAction>,
    archive: Option<PathBuf>,
    plan: Arc<BuildPlan>,
}

impl StepRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(name: impl Into<String>, action: Arc<dyn BuildAction>, plan: Arc<BuildPlan>) -> Self {
        Self {
            name: name.into(),
            action,
            archive: None,
            plan,
        }
    }

    /// Sets the downloaded archive to extract before the action runs.
    #[must_use]
    pub fn with_archive(mut self, archive: impl Into<PathBuf>) -> Self {
        self.archive = Some(archive.into());
        self
    }

    /// The step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks on the gate, then executes. Never runs the action if the gate
    /// is dropped without opening.
    pub async fn run(self, mut gate: GateWaiter) -> Result<()> {
        if !gate.wait().await {
            return Err(BuildError::Interrupted(format!(
                "gate for '{}' closed before opening",
                self.name
            )));
        }
        self.execute().await
    }

    /// Executes the step immediately.
    pub async fn execute(&self) -> Result<()> {
        let work = &self.plan.work;
        for dir in [&work.build, &work.src, &work.logs] {
            tokio::fs::create_dir_all(dir).await?;
        }
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}_build", self.name))
            .tempdir_in(&work.build)?;

        let mut dirs = StepDirs::new(
            work,
            &self.name,
            &self.plan.version,
            &self.plan.triplet,
            scratch.path(),
            self.plan.toolchain.clone(),
        );
        tokio::fs::create_dir_all(&dirs.prefix).await?;
        let log = StepLog::create(dirs.log_path())?;

        if let Some(ref archive) = self.archive {
            let (sources, owned) = (dirs.sources.clone(), archive.clone());
            let extracted = tokio::task::spawn_blocking(move || extract_archive(&sources, &owned))
                .await
                .map_err(|e| BuildError::Archive(e.to_string()))
                .and_then(|r| r);
            if let Err(e) = extracted {
                let _ = log.write_line(format!("Extraction failed: {e}"));
                return Err(self.failure(e.to_string()));
            }
            let source = dirs.sources.join(source_dir_name(archive));
            dirs = dirs.with_source(source);
        }

        let env = self.plan.step_env(&dirs);
        log.write_header(&dirs, &env)?;

        info!(step = %self.name, action = self.action.name(), "Running build action");
        let timer = StepTimer::start(&self.name);
        let result = AssertUnwindSafe(self.action.execute(&env, &dirs, &log))
            .catch_unwind()
            .await;
        let reason = match result {
            Ok(Ok(())) => {
                debug!(step = %self.name, duration_ms = timer.finish(), "Build action succeeded");
                return Ok(());
            }
            Ok(Err(e)) => format!("{e:?}"),
            Err(panic) => format!("build action panicked: {}", panic_message(&*panic)),
        };
        let _ = log.write_line(&reason);
        warn!(step = %self.name, log = %log.path().display(), "Build action failed");
        Err(self.failure(reason))
    }

    fn failure(&self, reason: String) -> BuildError {
        let summary = reason.lines().next().unwrap_or_default().to_string();
        BuildError::BuildAction {
            step: self.name.clone(),
            reason: summary,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
