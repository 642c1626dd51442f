//! Progress reporting.
//!
//! Reporters observe scheduler state and render it. They are called from the
//! orchestrator loop and never influence scheduling.

mod terminal;

pub use terminal::TerminalProgress;

use crate::core::StepOutcome;
use serde::{Deserialize, Serialize};

/// State of one step at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Step name.
    pub name: String,
    /// Current outcome.
    pub outcome: StepOutcome,
}

/// State of every scheduled step, in scheduling order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// One entry per step.
    pub entries: Vec<ProgressEntry>,
}

impl ProgressSnapshot {
    /// Number of steps in `outcome`.
    #[must_use]
    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    /// Whether every step reached a terminal outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_terminal())
    }
}

/// Renders scheduler state.
pub trait ProgressReporter: Send + Sync {
    /// Called on every orchestrator tick.
    fn render(&self, snapshot: &ProgressSnapshot);

    /// Called once after the last worker finished.
    fn finish(&self, snapshot: &ProgressSnapshot) {
        self.render(snapshot);
    }
}

/// Reporter that renders nothing. Used under CI and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn render(&self, _snapshot: &ProgressSnapshot) {}
}
