//! Workspace directory layout.
//!
//! This module provides:
//! - The fixed per-build directory layout
//! - Per-step directory views passed by value into workers
//! - Step log files and bounded log tails
//! - Source archive extraction

mod dirs;
mod extract;
mod log;

pub use dirs::{StepDirs, WorkDirs};
pub use extract::{extract_archive, source_dir_name};
pub use log::{read_log_tail, StepLog, BANNER};
