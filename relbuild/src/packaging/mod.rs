//! Finalization of a built interpreter into a relocatable archive.
//!
//! This module provides:
//! - The relocation seam and a command-backed relocator
//! - Sysconfig data rewriting and shebang patching
//! - The allow-listed archive writer
//! - The `Packager` that sequences all of the above

mod archive;
mod packager;
mod relocate;
mod runtime;
mod shebang;
mod sysconfig;

pub use archive::{create_archive, select_members, ArchiveAllowList, DEFAULT_ARCHIVE_GLOBS};
pub use packager::{Packager, PackagerOptions};
pub use relocate::{CommandRelocator, Relocator};
pub use runtime::{install_runtime, SITECUSTOMIZE};
pub use shebang::{patch_shebang, patch_shebangs, relative_shebang};
pub use sysconfig::{
    find_python_lib, find_sysconfigdata, install_sysconfigdata, rewrite_sysconfigdata,
};
