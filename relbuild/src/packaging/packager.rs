//! Post-build finalization of the interpreter prefix.

use super::archive::{create_archive, ArchiveAllowList, DEFAULT_ARCHIVE_GLOBS};
use super::relocate::Relocator;
use super::runtime::install_runtime;
use super::shebang::{patch_shebang, patch_shebangs, relative_shebang};
use super::sysconfig::{find_python_lib, find_sysconfigdata, install_sysconfigdata};
use crate::errors::{BuildError, Result};
use crate::recipes::{run_logged, BuildEnv};
use crate::workspace::StepLog;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Packaging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagerOptions {
    /// Archive allow-list.
    #[serde(default = "default_globs")]
    pub globs: Vec<String>,
    /// Run `ensurepip` and install `wheel` into the prefix.
    #[serde(default = "default_true")]
    pub bootstrap_pip: bool,
    /// Package pip-installed (with `--upgrade`) after `wheel`.
    #[serde(default)]
    pub self_package: Option<String>,
}

fn default_globs() -> Vec<String> {
    DEFAULT_ARCHIVE_GLOBS.iter().map(|g| (*g).to_string()).collect()
}

fn default_true() -> bool {
    true
}

impl Default for PackagerOptions {
    fn default() -> Self {
        Self {
            globs: default_globs(),
            bootstrap_pip: true,
            self_package: None,
        }
    }
}

impl PackagerOptions {
    /// Replaces the allow-list.
    #[must_use]
    pub fn with_globs<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.globs = globs.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables pip bootstrapping.
    #[must_use]
    pub fn with_bootstrap_pip(mut self, enabled: bool) -> Self {
        self.bootstrap_pip = enabled;
        self
    }

    /// Sets the package installed after `wheel`.
    #[must_use]
    pub fn with_self_package(mut self, package: impl Into<String>) -> Self {
        self.self_package = Some(package.into());
        self
    }
}

/// Turns a finished interpreter prefix into a relocatable archive.
///
/// In order: relocate binaries, rewrite sysconfig data, lay down the site
/// customization, bootstrap pip, rewrite script shebangs to prefix-relative
/// ones, install extra packages, then write `{prefix}.tar.xz`.
#[derive(Clone)]
pub struct Packager {
    relocator: Arc<dyn Relocator>,
    options: PackagerOptions,
}

impl std::fmt::Debug for Packager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packager")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Packager {
    /// Creates a packager.
    #[must_use]
    pub fn new(relocator: Arc<dyn Relocator>, options: PackagerOptions) -> Self {
        Self { relocator, options }
    }

    /// The options in use.
    #[must_use]
    pub fn options(&self) -> &PackagerOptions {
        &self.options
    }

    /// Archive path for `prefix`.
    #[must_use]
    pub fn archive_path(prefix: &Path) -> PathBuf {
        let mut name = prefix.as_os_str().to_owned();
        name.push(".tar.xz");
        PathBuf::from(name)
    }

    /// Finalizes `prefix` and returns the archive path.
    ///
    /// `env` is the interpreter step's environment; it supplies the version,
    /// host triplet, toolchain and native interpreter.
    pub async fn finalize(&self, prefix: &Path, env: &BuildEnv, log: &StepLog) -> Result<PathBuf> {
        let allow = ArchiveAllowList::new(&self.options.globs)?;
        info!(prefix = %prefix.display(), "Finalizing build");

        self.relocator
            .relocate(prefix, log)
            .await
            .map_err(|e| finalize_error("relocation", &e))?;

        let pymodules = find_python_lib(prefix).ok_or_else(|| {
            BuildError::Finalize(format!("no lib/python* directory under {}", prefix.display()))
        })?;
        let toolchain = env.get("RELBUILD_TOOLCHAIN").map(PathBuf::from);
        match find_sysconfigdata(&pymodules) {
            Some(module) => {
                install_sysconfigdata(&module, prefix, toolchain.as_deref())?;
            }
            None => warn!(dir = %pymodules.display(), "No sysconfig data module found"),
        }

        let site_packages = pymodules.join("site-packages");
        install_runtime(&site_packages)?;

        let cross = env.is_cross();
        let mut tool_env = env.clone();
        if cross {
            tool_env = tool_env.with("RELBUILD_CROSS", prefix.display().to_string());
        }
        let native = env.get("RELBUILD_NATIVE_PY").map(PathBuf::from);
        let bundled = prefix.join("bin").join("python3");

        if self.options.bootstrap_pip {
            let python = if cross {
                native.clone().ok_or_else(|| {
                    BuildError::Finalize("cross build without RELBUILD_NATIVE_PY".into())
                })?
            } else {
                bundled.clone()
            };
            run_logged(&python.to_string_lossy(), ["-m", "ensurepip"], &tool_env, prefix, log)
                .await
                .map_err(|e| finalize_error("ensurepip", &e))?;
        }

        Self::patch_scripts(prefix, &pymodules, env);

        if self.options.bootstrap_pip {
            let (python, target) = match native {
                Some(ref native) if cross && env.host_is_linux() => {
                    (native.clone(), Some(site_packages.clone()))
                }
                _ => (bundled, None),
            };
            let mut packages = vec![("wheel".to_string(), false)];
            if let Some(ref package) = self.options.self_package {
                packages.push((package.clone(), true));
            }
            for (package, upgrade) in packages {
                let mut args = vec!["-m".to_string(), "pip".into(), "install".into(), package];
                if upgrade {
                    args.push("--upgrade".into());
                }
                if let Some(ref target) = target {
                    args.push(format!("--target={}", target.display()));
                }
                run_logged(&python.to_string_lossy(), &args, &tool_env, prefix, log)
                    .await
                    .map_err(|e| finalize_error("pip install", &e))?;
            }
        }

        let archive = Self::archive_path(prefix);
        let (src, dest) = (prefix.to_path_buf(), archive.clone());
        let members = tokio::task::spawn_blocking(move || create_archive(&src, &dest, &allow))
            .await
            .map_err(|e| BuildError::Finalize(format!("archive task failed: {e}")))??;
        let _ = log.write_line(format!("Archived {members} files to {}", archive.display()));
        Ok(archive)
    }

    /// Rewrites absolute interpreter shebangs. The full `pythonX.Y` name is
    /// patched before the bare major name.
    fn patch_scripts(prefix: &Path, pymodules: &Path, env: &BuildEnv) {
        let bindir = prefix.join("bin");
        let major = env.get("RELBUILD_PY_MAJOR_VERSION").unwrap_or("3");
        let bare = major.split('.').next().unwrap_or(major);
        let new = relative_shebang("python3");
        for name in [format!("python{major}"), format!("python{bare}")] {
            let old = format!("#!{}", bindir.join(&name).display());
            let count = patch_shebangs(&bindir, &old, &new);
            info!(shebang = %old, patched = count, "Patched shebangs");
        }

        if env.host_is_linux() {
            let host = env.get("RELBUILD_HOST").unwrap_or_default();
            let config = pymodules
                .join(format!("config-{major}-{host}"))
                .join("python-config.py");
            let old = format!("#!{}", bindir.join(format!("python{major}")).display());
            patch_one(&config, &old, &relative_shebang("../../../bin/python3"));
        }
        patch_one(
            &pymodules.join("cgi.py"),
            "#! /usr/local/bin/python",
            &relative_shebang("../../bin/python3"),
        );
    }
}

fn patch_one(path: &Path, old: &str, new: &str) {
    if let Err(e) = patch_shebang(path, old, new) {
        warn!(path = %path.display(), error = %e, "Unable to patch shebang");
    }
}

fn finalize_error(stage: &str, err: &anyhow::Error) -> BuildError {
    BuildError::Finalize(format!("{stage}: {err:#}"))
}
