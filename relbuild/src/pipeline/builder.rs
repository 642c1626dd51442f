//! Build façade: registry, downloads, scheduling and packaging for one
//! version and architecture.

use super::failure::collect_log_tails;
use super::runner::{BuildPlan, EnvHook, StepRunner};
use super::scheduler::{BuildReport, ScheduledStep, Scheduler};
use crate::cancellation::CancellationToken;
use crate::config::BuildConfig;
use crate::core::{StepOutcome, Triplet};
use crate::download::{
    Checksum, CommandVerifier, Download, DownloadPhase, DownloadSummary, Fetcher, HttpFetcher,
    SignatureVerifier,
};
use crate::errors::{BuildError, Result};
use crate::packaging::Packager;
use crate::progress::{ProgressReporter, SilentProgress, TerminalProgress};
use crate::recipes::{BuildAction, ConfigureMake, Recipe, StepRegistry};
use crate::workspace::{StepDirs, StepLog, WorkDirs};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Name of the step that builds the interpreter itself.
pub const INTERPRETER_STEP: &str = "python";

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Scheduler report.
    pub report: BuildReport,
    /// The packaged archive, when a packager is configured.
    pub archive: Option<PathBuf>,
}

/// Builds one interpreter version for one architecture.
///
/// Owns the step registry and everything derived from the configuration:
/// the workspace layout, target triplet, toolchain and native interpreter
/// locations.
#[derive(Clone)]
pub struct Builder {
    config: BuildConfig,
    work: WorkDirs,
    registry: StepRegistry,
    triplet: Triplet,
    build_triplet: Triplet,
    fetcher: Arc<dyn Fetcher>,
    verifier: Arc<dyn SignatureVerifier>,
    reporter: Arc<dyn ProgressReporter>,
    packager: Option<Packager>,
    env_hook: Option<EnvHook>,
    interpreter_step: String,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("version", &self.config.version)
            .field("triplet", &self.triplet)
            .field("root", &self.work.root)
            .field("steps", &self.registry.names())
            .field("packager", &self.packager)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Creates a builder with an HTTP fetcher, the configured signature tool
    /// and a progress line unless running under CI.
    pub fn new(config: BuildConfig) -> Result<Self> {
        config.validate()?;
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.fetch)?);
        let verifier: Arc<dyn SignatureVerifier> =
            Arc::new(CommandVerifier::new(config.signature_tool.clone()));
        let reporter: Arc<dyn ProgressReporter> = if config.ci {
            Arc::new(SilentProgress)
        } else {
            Arc::new(TerminalProgress::default())
        };
        Ok(Self {
            work: WorkDirs::new(&config.root),
            triplet: Triplet::for_arch(&config.arch),
            build_triplet: Triplet::build_host(),
            registry: StepRegistry::new(),
            fetcher,
            verifier,
            reporter,
            packager: None,
            env_hook: None,
            interpreter_step: INTERPRETER_STEP.to_string(),
            config,
        })
    }

    /// Replaces the fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replaces the signature verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replaces the progress reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Packages the interpreter prefix after a successful build.
    #[must_use]
    pub fn with_packager(mut self, packager: Packager) -> Self {
        self.packager = Some(packager);
        self
    }

    /// Adjusts every step's environment after the standard variables.
    #[must_use]
    pub fn with_env_hook(mut self, hook: EnvHook) -> Self {
        self.env_hook = Some(hook);
        self
    }

    /// Names the step whose download carries the interpreter version.
    #[must_use]
    pub fn with_interpreter_step(mut self, name: impl Into<String>) -> Self {
        self.interpreter_step = name.into();
        self
    }

    /// Registers a step. Without an action, `./configure && make && make
    /// install` is used. The download is stored in the workspace cache.
    pub fn add_step(
        &mut self,
        name: &str,
        action: Option<Arc<dyn BuildAction>>,
        dependencies: &[&str],
        download: Option<Download>,
    ) -> Result<()> {
        let action =
            action.unwrap_or_else(|| Arc::new(ConfigureMake::new(self.config.make_jobs)));
        let mut recipe =
            Recipe::new(name, action).with_dependencies(dependencies.iter().copied());
        if let Some(download) = download {
            recipe = recipe.with_download(download.with_destination(&self.work.download));
        }
        self.registry.register(recipe)
    }

    /// A copy of this builder targeting another interpreter version. The
    /// interpreter step's download is re-pinned; without a checksum the
    /// previous one is dropped.
    pub fn with_version(&self, version: &str, checksum: Option<Checksum>) -> Result<Self> {
        let mut copy = self.clone();
        copy.config.version = version.to_string();
        if let Some(download) = self
            .registry
            .get(&self.interpreter_step)
            .and_then(|r| r.download.clone())
        {
            let download = download.with_version(version);
            let download = match checksum {
                Some(checksum) => download.with_checksum(checksum),
                None => download.without_checksum(),
            };
            copy.registry = copy
                .registry
                .with_download(&self.interpreter_step, download)?;
        }
        copy.config.validate()?;
        Ok(copy)
    }

    /// Retargets the builder to another architecture.
    pub fn set_arch(&mut self, arch: &str) {
        self.config.arch = arch.to_string();
        self.triplet = Triplet::for_arch(arch);
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The registered steps.
    #[must_use]
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// The workspace layout.
    #[must_use]
    pub fn work(&self) -> &WorkDirs {
        &self.work
    }

    /// Interpreter version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Target triplet.
    #[must_use]
    pub fn triplet(&self) -> &Triplet {
        &self.triplet
    }

    /// Install prefix.
    #[must_use]
    pub fn prefix(&self) -> PathBuf {
        self.work.prefix(&self.config.version, &self.triplet)
    }

    /// Final archive location.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        Packager::archive_path(&self.prefix())
    }

    /// Managed toolchain for the target, on platforms that have one.
    #[must_use]
    pub fn toolchain(&self) -> Option<PathBuf> {
        self.triplet
            .platform()
            .uses_managed_toolchain()
            .then(|| self.config.toolchain_root().join(self.triplet.to_string()))
    }

    /// Whether the target architecture differs from the build host's.
    #[must_use]
    pub fn is_cross(&self) -> bool {
        self.triplet.arch() != self.build_triplet.arch()
    }

    /// Natively built interpreter used to drive a cross build.
    #[must_use]
    pub fn native_python(&self) -> Option<PathBuf> {
        self.is_cross()
            .then(|| self.config.native_root().join("bin").join("python3"))
    }

    /// Human-readable descriptions of missing prerequisites.
    #[must_use]
    pub fn check_prereqs(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(toolchain) = self.toolchain() {
            if !toolchain.exists() {
                failures.push(format!("Toolchain for {} not found at {}", self.triplet, toolchain.display()));
            }
        }
        failures
    }

    /// Removes the prefix, the source area and any previous archive.
    pub fn clean(&self) {
        for path in [self.prefix(), self.work.src.clone()] {
            remove_path(&path, true);
        }
        remove_path(&self.archive_path(), false);
    }

    /// Removes the prefix, keeping the archive.
    pub fn cleanup(&self) {
        info!(prefix = %self.prefix().display(), "Removing build prefix");
        remove_path(&self.prefix(), true);
    }

    fn plan(&self) -> Arc<BuildPlan> {
        Arc::new(BuildPlan {
            work: self.work.clone(),
            version: self.config.version.clone(),
            triplet: self.triplet.clone(),
            build_triplet: self.build_triplet.clone(),
            toolchain: self.toolchain(),
            data_dir: Some(self.config.data_dir.clone()),
            native_python: self.native_python(),
            passthrough: self.config.env_passthrough.clone(),
            env_hook: self.env_hook.clone(),
        })
    }

    /// Fetches and verifies the archives of the requested steps (all steps
    /// when `None`).
    pub async fn download_files(&self, steps: Option<&[String]>) -> Result<DownloadSummary> {
        let names = self.registry.resolve(steps)?;
        let downloads = self.registry.downloads_for(&names);
        info!(count = downloads.len(), "Downloading source archives");
        DownloadPhase::new(Arc::clone(&self.fetcher), Arc::clone(&self.verifier))
            .with_force(self.config.force_download)
            .run(downloads)
            .await
    }

    /// Builds the requested steps (all steps when `None`).
    ///
    /// Fails with [`BuildError::BuildPhase`] when any step failed or was
    /// cancelled; the error carries the failing steps' log tails.
    pub async fn build(&self, steps: Option<&[String]>) -> Result<BuildReport> {
        self.build_with(steps, None).await
    }

    async fn build_with(
        &self,
        steps: Option<&[String]>,
        interrupt: Option<CancellationToken>,
    ) -> Result<BuildReport> {
        self.registry.validate()?;
        let names = self.registry.resolve(steps)?;
        self.work.create()?;

        let plan = self.plan();
        let mut scheduled = Vec::with_capacity(names.len());
        for name in &names {
            let recipe = self
                .registry
                .get(name)
                .ok_or_else(|| BuildError::UnknownStep(name.clone()))?;
            let mut runner = StepRunner::new(name, Arc::clone(&recipe.action), Arc::clone(&plan));
            if let Some(ref download) = recipe.download {
                runner = runner.with_archive(download.filepath());
            }
            scheduled.push(ScheduledStep::new(runner, recipe.dependencies.clone()));
        }

        let mut scheduler = Scheduler::new(self.config.poll_interval(), Arc::clone(&self.reporter));
        if let Some(token) = interrupt {
            scheduler = scheduler.with_interrupt(token);
        }
        let report = scheduler.execute(scheduled).await?;
        if report.success() {
            return Ok(report);
        }

        let failed_records: Vec<_> = report
            .failures
            .iter()
            .filter(|r| r.outcome == StepOutcome::Failed)
            .cloned()
            .collect();
        let log_tails = collect_log_tails(&failed_records, &self.work, self.config.log_tail_bytes);
        let failed = report.failed_steps();
        error!(failed = ?failed, "Build failed\n{log_tails}");
        if self.config.cleanup {
            self.cleanup();
        }
        Err(BuildError::BuildPhase { failed, log_tails })
    }

    /// Runs prerequisites, downloads, the build and packaging.
    pub async fn run(&self, steps: Option<&[String]>) -> Result<BuildOutput> {
        self.run_inner(steps, None).await
    }

    /// Like [`Builder::run`], aborting every worker when `token` fires.
    pub async fn run_with_interrupt(
        &self,
        steps: Option<&[String]>,
        token: CancellationToken,
    ) -> Result<BuildOutput> {
        self.run_inner(steps, Some(token)).await
    }

    async fn run_inner(
        &self,
        steps: Option<&[String]>,
        interrupt: Option<CancellationToken>,
    ) -> Result<BuildOutput> {
        let missing = self.check_prereqs();
        if !missing.is_empty() {
            return Err(BuildError::PrerequisiteMissing(missing));
        }
        if self.config.clean {
            self.clean();
        }
        self.work.create()?;

        if let Some(native) = self.native_python() {
            if !native.exists() {
                return Err(BuildError::PrerequisiteMissing(vec![format!(
                    "Native interpreter required for cross build not found at {}",
                    native.display()
                )]));
            }
        }

        self.download_files(steps).await?;
        let report = self.build_with(steps, interrupt).await?;

        let archive = match self.packager {
            Some(ref packager) if report.outcome(&self.interpreter_step) == Some(StepOutcome::Succeeded) => {
                Some(self.finalize(packager).await?)
            }
            Some(_) => {
                warn!(step = %self.interpreter_step, "Interpreter step not built, skipping packaging");
                None
            }
            None => None,
        };

        if self.config.cleanup {
            self.cleanup();
        }
        Ok(BuildOutput { report, archive })
    }

    async fn finalize(&self, packager: &Packager) -> Result<PathBuf> {
        let prefix = self.prefix();
        let dirs = StepDirs::new(
            &self.work,
            &self.interpreter_step,
            &self.config.version,
            &self.triplet,
            &prefix,
            self.toolchain(),
        );
        let env = self.plan().step_env(&dirs);
        let log = StepLog::create(self.work.log_file("finalize"))?;
        log.write_header(&dirs, &env)?;
        let archive = packager.finalize(&prefix, &env, &log).await;
        if let Err(ref e) = archive {
            let _ = log.write_line(e.to_string());
            if self.config.cleanup {
                self.cleanup();
            }
        }
        archive
    }

    /// Looks for newer upstream versions of every download that has a
    /// version check configured. Steps whose check page cannot be fetched are
    /// logged and left out.
    #[cfg(feature = "version-check")]
    pub async fn check_versions(
        &self,
    ) -> Result<std::collections::BTreeMap<String, crate::download::VersionReport>> {
        let mut reports = std::collections::BTreeMap::new();
        for name in self.registry.names() {
            let Some(download) = self.registry.get(name).and_then(|r| r.download.as_ref()) else {
                continue;
            };
            if !download.has_version_check() {
                continue;
            }
            match download.check_for_newer_version(self.fetcher.as_ref()).await {
                Ok(report) => {
                    for newer in &report.newer {
                        info!(step = %name, current = %download.version(), newer = %newer, "Newer version available");
                    }
                    for bogus in &report.incomparable {
                        warn!(step = %name, version = %bogus, "Unable to compare versions");
                    }
                    reports.insert(name.clone(), report);
                }
                Err(e) => warn!(step = %name, error = %e, "Version check failed"),
            }
        }
        Ok(reports)
    }
}

fn remove_path(path: &Path, dir: bool) {
    let result = if dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => info!(path = %path.display(), "Removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Unable to remove"),
    }
}
