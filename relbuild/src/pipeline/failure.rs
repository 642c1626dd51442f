//! Failure records collected during a build.

use crate::core::StepOutcome;
use crate::errors::BuildError;
use crate::workspace::{read_log_tail, WorkDirs};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Record of a step that failed or was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Step name.
    pub step: String,
    /// `Failed` or `Cancelled`.
    pub outcome: StepOutcome,
    /// Failure detail.
    pub reason: String,
    /// For cancellations, the dependency that failed.
    pub dependency: Option<String>,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// A step whose build action failed.
    #[must_use]
    pub fn failed(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            outcome: StepOutcome::Failed,
            reason: reason.into(),
            dependency: None,
            timestamp: Utc::now(),
        }
    }

    /// A step cancelled because `dependency` failed.
    #[must_use]
    pub fn cancelled(step: impl Into<String>, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        Self {
            step: step.into(),
            outcome: StepOutcome::Cancelled,
            reason: format!("dependency '{dependency}' failed"),
            dependency: Some(dependency),
            timestamp: Utc::now(),
        }
    }

    /// The matching error value.
    #[must_use]
    pub fn to_error(&self) -> BuildError {
        match self.dependency {
            Some(ref dependency) => BuildError::DependencyCascade {
                step: self.step.clone(),
                dependency: dependency.clone(),
            },
            None => BuildError::BuildAction {
                step: self.step.clone(),
                reason: self.reason.clone(),
            },
        }
    }
}

/// Collects failure records during a build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureCollector {
    records: Vec<FailureRecord>,
}

impl FailureCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record.
    pub fn add(&mut self, record: FailureRecord) {
        self.records.push(record);
    }

    /// Whether anything failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.records.is_empty()
    }

    /// All records in the order they were recorded.
    #[must_use]
    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// Consumes the collector.
    #[must_use]
    pub fn into_records(self) -> Vec<FailureRecord> {
        self.records
    }
}

/// Frames one step's log tail for the failure summary.
#[must_use]
pub fn format_log_tail(step: &str, tail: &str) -> String {
    let bar = "=".repeat(20);
    format!("{bar} {step} {bar}\n{tail}\n\n")
}

/// Bounded log tails of the given records' steps. Steps without a log are
/// skipped.
#[must_use]
pub fn collect_log_tails(records: &[FailureRecord], work: &WorkDirs, max_bytes: u64) -> String {
    let mut out = String::new();
    for record in records {
        if let Ok(tail) = read_log_tail(&work.log_file(&record.step), max_bytes) {
            let _ = write!(out, "{}", format_log_tail(&record.step, &tail));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_convert_to_taxonomy() {
        assert!(matches!(
            FailureRecord::failed("zlib", "exit 2").to_error(),
            BuildError::BuildAction { .. }
        ));
        let cancelled = FailureRecord::cancelled("python", "zlib");
        assert_eq!(cancelled.outcome, StepOutcome::Cancelled);
        assert!(matches!(
            cancelled.to_error(),
            BuildError::DependencyCascade { ref dependency, .. } if dependency == "zlib"
        ));
    }

    #[test]
    fn test_log_tails_skip_missing_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let work = WorkDirs::new(tmp.path());
        work.create().unwrap();
        std::fs::write(work.log_file("zlib"), "configure: error: no compiler\n").unwrap();

        let records = vec![
            FailureRecord::failed("zlib", "exit 1"),
            FailureRecord::cancelled("python", "zlib"),
        ];
        let tails = collect_log_tails(&records, &work, 4096);
        assert!(tails.starts_with("==================== zlib ===================="));
        assert!(tails.contains("no compiler"));
        assert!(!tails.contains("python"));
    }
}
