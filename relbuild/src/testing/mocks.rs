//! Mock build actions for testing.

use crate::packaging::Relocator;
use crate::recipes::{BuildAction, BuildEnv};
use crate::workspace::{StepDirs, StepLog};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One entry in a [`Journal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEvent {
    /// A build action began.
    Started(String),
    /// A build action returned successfully.
    Finished(String),
}

/// Shared, ordered record of action starts and finishes across steps.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<JournalEvent>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: JournalEvent) {
        self.events.lock().push(event);
    }

    /// All events so far.
    #[must_use]
    pub fn events(&self) -> Vec<JournalEvent> {
        self.events.lock().clone()
    }

    /// Position of an event, if it happened.
    #[must_use]
    pub fn position(&self, event: &JournalEvent) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    /// Whether the step's action ever started.
    #[must_use]
    pub fn started(&self, step: &str) -> bool {
        self.position(&JournalEvent::Started(step.to_string())).is_some()
    }

    /// Whether `step` started after `dependency` finished.
    #[must_use]
    pub fn started_after(&self, step: &str, dependency: &str) -> bool {
        match (
            self.position(&JournalEvent::Started(step.to_string())),
            self.position(&JournalEvent::Finished(dependency.to_string())),
        ) {
            (Some(start), Some(finish)) => start > finish,
            _ => false,
        }
    }
}

/// An action that records its start and finish in a journal, optionally
/// sleeping in between.
#[derive(Debug)]
pub struct RecordingAction {
    name: String,
    journal: Journal,
    delay: Duration,
    calls: AtomicUsize,
}

impl RecordingAction {
    /// Creates a recording action.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: Journal) -> Self {
        Self {
            name: name.into(),
            journal,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` before finishing.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of times the action ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildAction for RecordingAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _env: &BuildEnv, dirs: &StepDirs, log: &StepLog) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.push(JournalEvent::Started(dirs.name.clone()));
        log.write_line(format!("recording {}", dirs.name))?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.journal.push(JournalEvent::Finished(dirs.name.clone()));
        Ok(())
    }
}

/// An action that always fails after writing its message to the log.
#[derive(Debug)]
pub struct FailingAction {
    name: String,
    message: String,
    calls: AtomicUsize,
}

impl FailingAction {
    /// Creates a failing action.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times the action ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildAction for FailingAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _env: &BuildEnv, _dirs: &StepDirs, log: &StepLog) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        log.write_line(&self.message)?;
        anyhow::bail!("{}", self.message)
    }
}

/// An action that sleeps, for exercising interrupts and concurrency.
#[derive(Debug)]
pub struct SlowAction {
    name: String,
    delay: Duration,
}

impl SlowAction {
    /// Creates a slow action.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl BuildAction for SlowAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _env: &BuildEnv, _dirs: &StepDirs, _log: &StepLog) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// An action that panics.
#[derive(Debug)]
pub struct PanickingAction {
    name: String,
}

impl PanickingAction {
    /// Creates a panicking action.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl BuildAction for PanickingAction {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::panic)]
    async fn execute(&self, _env: &BuildEnv, dirs: &StepDirs, _log: &StepLog) -> anyhow::Result<()> {
        panic!("{} exploded", dirs.name)
    }
}

/// A relocator that only records the prefixes it was given.
#[derive(Debug, Clone, Default)]
pub struct NoopRelocator {
    prefixes: Arc<Mutex<Vec<PathBuf>>>,
}

impl NoopRelocator {
    /// Creates a relocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes relocated so far.
    #[must_use]
    pub fn prefixes(&self) -> Vec<PathBuf> {
        self.prefixes.lock().clone()
    }
}

#[async_trait]
impl Relocator for NoopRelocator {
    async fn relocate(&self, prefix: &Path, log: &StepLog) -> anyhow::Result<()> {
        log.write_line(format!("relocate {}", prefix.display()))?;
        self.prefixes.lock().push(prefix.to_path_buf());
        Ok(())
    }
}
