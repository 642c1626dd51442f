//! Step outcome enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The scheduling outcome of a step.
///
/// Steps move `Pending -> Running -> {Succeeded, Failed}`; `Cancelled` is
/// reachable from `Pending` when a dependency fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Waiting on its gate.
    #[default]
    Pending,
    /// Gate set; the build action may be executing.
    Running,
    /// Build action completed successfully.
    Succeeded,
    /// Build action exited non-zero, faulted, or the worker crashed.
    Failed,
    /// Never ran because a dependency failed.
    Cancelled,
}

impl StepOutcome {
    /// Returns true once the step can no longer change state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns true for outcomes that fail the build.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!StepOutcome::Pending.is_terminal());
        assert!(!StepOutcome::Running.is_terminal());
        assert!(StepOutcome::Succeeded.is_terminal());
        assert!(StepOutcome::Failed.is_terminal());
        assert!(StepOutcome::Cancelled.is_terminal());
    }

    #[test]
    fn test_failure_states() {
        assert!(StepOutcome::Failed.is_failure());
        assert!(StepOutcome::Cancelled.is_failure());
        assert!(!StepOutcome::Succeeded.is_failure());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&StepOutcome::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        assert_eq!(StepOutcome::default(), StepOutcome::Pending);
    }
}
