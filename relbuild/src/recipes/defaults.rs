//! Named build actions.

use super::action::{run_logged, BuildAction};
use super::env::BuildEnv;
use crate::core::Platform;
use crate::workspace::{StepDirs, StepLog};
use async_trait::async_trait;

fn cross_args(env: &BuildEnv, build_key: &str) -> Vec<String> {
    if !env.host_is_linux() {
        return Vec::new();
    }
    let mut args = Vec::new();
    if let Some(build) = env.get(build_key) {
        args.push(format!("--build={build}"));
    }
    if let Some(host) = env.get("RELBUILD_HOST") {
        args.push(format!("--host={host}"));
    }
    args
}

/// `./configure --prefix=…`, `make -jN`, `make install`. The default action.
#[derive(Debug, Clone)]
pub struct ConfigureMake {
    jobs: usize,
    extra_args: Vec<String>,
}

impl Default for ConfigureMake {
    fn default() -> Self {
        Self::new(8)
    }
}

impl ConfigureMake {
    /// Creates the action with `jobs` parallel make jobs.
    #[must_use]
    pub fn new(jobs: usize) -> Self {
        Self {
            jobs,
            extra_args: Vec::new(),
        }
    }

    /// Appends extra configure arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Arguments passed to `./configure`.
    #[must_use]
    pub fn configure_args(&self, env: &BuildEnv, dirs: &StepDirs) -> Vec<String> {
        let mut args = vec![format!("--prefix={}", dirs.prefix.display())];
        args.extend(cross_args(env, "RELBUILD_BUILD"));
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl BuildAction for ConfigureMake {
    fn name(&self) -> &str {
        "configure-make"
    }

    async fn execute(&self, env: &BuildEnv, dirs: &StepDirs, log: &StepLog) -> anyhow::Result<()> {
        let cwd = dirs.workdir();
        run_logged("./configure", self.configure_args(env, dirs), env, cwd, log).await?;
        run_logged("make", [format!("-j{}", self.jobs)], env, cwd, log).await?;
        run_logged("make", ["install"], env, cwd, log).await
    }
}

/// OpenSSL's own `./Configure` followed by `make install_sw`.
#[derive(Debug, Clone)]
pub struct OpenSslBuild {
    jobs: usize,
}

impl Default for OpenSslBuild {
    fn default() -> Self {
        Self::new(8)
    }
}

impl OpenSslBuild {
    /// Creates the action with `jobs` parallel make jobs.
    #[must_use]
    pub fn new(jobs: usize) -> Self {
        Self { jobs }
    }

    /// The OpenSSL configuration target for a step's triplet.
    #[must_use]
    pub fn target(dirs: &StepDirs) -> String {
        let arch = dirs.triplet.arch();
        match dirs.triplet.platform() {
            Platform::MacOs if arch == "x86_64" => "darwin64-x86_64-cc".to_string(),
            Platform::MacOs => "darwin64-arm64-cc".to_string(),
            Platform::Windows if arch == "x86_64" => "VC-WIN64A".to_string(),
            Platform::Windows => "VC-WIN64-ARM".to_string(),
            Platform::Linux => format!("linux-{arch}"),
        }
    }

    /// Arguments passed to `./Configure`.
    #[must_use]
    pub fn configure_args(dirs: &StepDirs) -> Vec<String> {
        vec![
            Self::target(dirs),
            "no-idea".to_string(),
            "shared".to_string(),
            format!("--prefix={}", dirs.prefix.display()),
            format!("--openssldir={}", dirs.tmpbuild.join("ssl").display()),
            "--libdir=lib".to_string(),
        ]
    }
}

#[async_trait]
impl BuildAction for OpenSslBuild {
    fn name(&self) -> &str {
        "openssl"
    }

    async fn execute(&self, env: &BuildEnv, dirs: &StepDirs, log: &StepLog) -> anyhow::Result<()> {
        let cwd = dirs.workdir();
        run_logged("./Configure", Self::configure_args(dirs), env, cwd, log).await?;
        run_logged("make", [format!("-j{}", self.jobs)], env, cwd, log).await?;
        run_logged("make", ["install_sw"], env, cwd, log).await
    }
}

/// SQLite's autoconf build as a shared, thread-safe library.
#[derive(Debug, Clone)]
pub struct SqliteBuild {
    jobs: usize,
}

impl Default for SqliteBuild {
    fn default() -> Self {
        Self::new(8)
    }
}

impl SqliteBuild {
    /// Creates the action with `jobs` parallel make jobs.
    #[must_use]
    pub fn new(jobs: usize) -> Self {
        Self { jobs }
    }

    /// Arguments passed to `./configure`.
    #[must_use]
    pub fn configure_args(env: &BuildEnv, dirs: &StepDirs) -> Vec<String> {
        let mut args: Vec<String> = [
            "--with-shared",
            "--without-static",
            "--enable-threadsafe",
            "--disable-readline",
            "--disable-dependency-tracking",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
        args.push(format!("--prefix={}", dirs.prefix.display()));
        args.push("--enable-add-ons=nptl,ports".to_string());
        args.extend(cross_args(env, "RELBUILD_BUILD_ARCH"));
        args
    }
}

#[async_trait]
impl BuildAction for SqliteBuild {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn execute(&self, env: &BuildEnv, dirs: &StepDirs, log: &StepLog) -> anyhow::Result<()> {
        let cwd = dirs.workdir();
        run_logged("./configure", Self::configure_args(env, dirs), env, cwd, log).await?;
        run_logged("make", [format!("-j{}", self.jobs)], env, cwd, log).await?;
        run_logged("make", ["install"], env, cwd, log).await
    }
}
