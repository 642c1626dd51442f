//! Site customization laid into the packaged interpreter.

use std::io;
use std::path::{Path, PathBuf};

/// `sitecustomize.py` restricting `sys.path` to the relocated prefix (or a
/// virtualenv created from it) plus `PYTHONPATH`, then handing over to the
/// relbuild runtime package when it is installed.
pub const SITECUSTOMIZE: &str = r#""""
relbuild site customize
"""
import os
import site
import sys

__valid_path_prefixes = tuple({sys.prefix, sys.base_prefix})
__sys_path = [p for p in sys.path if p.startswith(__valid_path_prefixes)]
if "PYTHONPATH" in os.environ:
    __sep = ";" if sys.platform == "win32" else ":"
    __sys_path.extend(os.environ["PYTHONPATH"].split(__sep))

sys.path[:] = __sys_path
site.ENABLE_USER_SITE = False

try:
    import relbuild.runtime
except ImportError:
    if "RELBUILD_DEBUG" in os.environ:
        print("Unable to find relbuild.runtime for bootstrap.", file=sys.stderr, flush=True)
else:
    relbuild.runtime.bootstrap()
"#;

/// Writes `sitecustomize.py` into `site_packages`, creating the directory
/// when needed. Returns the written path.
pub fn install_runtime(site_packages: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(site_packages)?;
    let path = site_packages.join("sitecustomize.py");
    std::fs::write(&path, SITECUSTOMIZE)?;
    Ok(path)
}
