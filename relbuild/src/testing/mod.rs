//! Testing utilities for relbuild.
//!
//! This module provides:
//! - Mock build actions that record, fail, stall or panic
//! - A no-op relocator
//! - Scratch workspaces and source archives

mod fixtures;
mod mocks;

pub use fixtures::{write_source_archive, TestWorkspace};
pub use mocks::{
    FailingAction, Journal, JournalEvent, NoopRelocator, PanickingAction, RecordingAction,
    SlowAction,
};
