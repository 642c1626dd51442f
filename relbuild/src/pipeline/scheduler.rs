//! Dependency-gated step scheduler.
//!
//! Every step's worker is spawned up front and parked on its gate. The
//! orchestrator loop is the only writer of scheduling state: it opens gates as
//! dependencies succeed, cancels the dependent subtree of a failed step and
//! feeds the progress reporter on every tick.

use super::failure::{FailureCollector, FailureRecord};
use super::gate::Gate;
use super::runner::StepRunner;
use crate::cancellation::CancellationToken;
use crate::core::StepOutcome;
use crate::errors::{BuildError, Result};
use crate::progress::{ProgressEntry, ProgressReporter, ProgressSnapshot};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A step handed to the scheduler.
#[derive(Debug, Clone)]
pub struct ScheduledStep {
    /// Step name.
    pub name: String,
    /// Steps that must succeed first. Names outside the scheduled set are
    /// ignored.
    pub dependencies: Vec<String>,
    /// Executes the step once released.
    pub runner: StepRunner,
}

impl ScheduledStep {
    /// Creates a scheduled step.
    #[must_use]
    pub fn new(runner: StepRunner, dependencies: Vec<String>) -> Self {
        Self {
            name: runner.name().to_string(),
            dependencies,
            runner,
        }
    }
}

/// Result of a scheduler run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Final outcome of every scheduled step.
    pub outcomes: BTreeMap<String, StepOutcome>,
    /// Failed and cancelled steps, in the order they were recorded.
    pub failures: Vec<FailureRecord>,
    /// Steps in the order their gates opened.
    pub started: Vec<String>,
    /// Steps in the order their workers finished.
    pub finished: Vec<String>,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl BuildReport {
    /// True when every step succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failures.is_empty()
            && self.outcomes.values().all(|o| *o == StepOutcome::Succeeded)
    }

    /// Names of failed and cancelled steps, sorted.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<String> {
        let mut names: Vec<String> = self.failures.iter().map(|r| r.step.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Outcome of one step.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<StepOutcome> {
        self.outcomes.get(name).copied()
    }
}

struct StepState {
    remaining: HashSet<String>,
    gate: Gate,
    abort: AbortHandle,
    outcome: StepOutcome,
}

/// Orchestrator-private scheduling state.
struct Orchestration {
    order: Vec<String>,
    steps: HashMap<String, StepState>,
    dependents: HashMap<String, Vec<String>>,
    failures: FailureCollector,
    started: Vec<String>,
    finished: Vec<String>,
}

impl Orchestration {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            entries: self
                .order
                .iter()
                .filter_map(|name| {
                    self.steps.get(name).map(|state| ProgressEntry {
                        name: name.clone(),
                        outcome: state.outcome,
                    })
                })
                .collect(),
        }
    }

    fn complete(&mut self, name: &str, joined: std::result::Result<Result<()>, JoinError>) {
        let Some(state) = self.steps.get_mut(name) else {
            return;
        };
        // Aborted by a cascade; already recorded.
        if state.outcome == StepOutcome::Cancelled {
            return;
        }
        self.finished.push(name.to_string());

        match joined {
            Ok(Ok(())) => {
                state.outcome = StepOutcome::Succeeded;
                info!(step = %name, "Step succeeded");
                self.release_dependents(name);
            }
            Ok(Err(e)) => {
                state.outcome = StepOutcome::Failed;
                error!(step = %name, error = %e, "Step failed");
                self.failures.add(FailureRecord::failed(name, e.to_string()));
                self.cascade(name);
            }
            Err(e) => {
                state.outcome = StepOutcome::Failed;
                let reason = if e.is_panic() {
                    "worker panicked".to_string()
                } else {
                    format!("worker terminated: {e}")
                };
                error!(step = %name, reason = %reason, "Step worker crashed");
                self.failures.add(FailureRecord::failed(name, reason));
                self.cascade(name);
            }
        }
    }

    fn release_dependents(&mut self, name: &str) {
        let Some(dependents) = self.dependents.get(name) else {
            return;
        };
        for dependent in dependents {
            let Some(state) = self.steps.get_mut(dependent) else {
                continue;
            };
            state.remaining.remove(name);
            if state.remaining.is_empty() && state.outcome == StepOutcome::Pending {
                state.gate.open();
                state.outcome = StepOutcome::Running;
                debug!(step = %dependent, "Dependencies satisfied, gate opened");
                self.started.push(dependent.clone());
            }
        }
    }

    /// Cancels everything transitively depending on `failed`. A step whose
    /// gate is already open is left alone.
    fn cascade(&mut self, failed: &str) {
        let mut stack: Vec<String> = self.dependents.get(failed).cloned().unwrap_or_default();
        while let Some(name) = stack.pop() {
            let Some(state) = self.steps.get_mut(&name) else {
                continue;
            };
            if state.gate.is_open() || state.outcome.is_terminal() {
                continue;
            }
            state.outcome = StepOutcome::Cancelled;
            state.abort.abort();
            warn!(step = %name, dependency = %failed, "Cancelling step after dependency failure");
            self.failures.add(FailureRecord::cancelled(&name, failed));
            if let Some(next) = self.dependents.get(&name) {
                stack.extend(next.iter().cloned());
            }
        }
    }

    fn abort_all(&mut self) {
        for state in self.steps.values_mut() {
            if !state.outcome.is_terminal() {
                state.abort.abort();
                state.outcome = StepOutcome::Cancelled;
            }
        }
    }
}

/// Runs scheduled steps with maximal parallelism subject to their
/// dependencies.
#[derive(Clone)]
pub struct Scheduler {
    poll_interval: Duration,
    reporter: Arc<dyn ProgressReporter>,
    interrupt: Option<CancellationToken>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("poll_interval", &self.poll_interval)
            .field("interrupt", &self.interrupt)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler ticking every `poll_interval`.
    #[must_use]
    pub fn new(poll_interval: Duration, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            poll_interval,
            reporter,
            interrupt: None,
        }
    }

    /// Aborts every worker when `token` is cancelled.
    #[must_use]
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    /// Runs every step to a terminal outcome.
    ///
    /// Returns a report even when steps failed; only an operator interrupt or
    /// an invalid step set is an error.
    pub async fn execute(&self, steps: Vec<ScheduledStep>) -> Result<BuildReport> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::now_v7();

        let names: HashSet<String> = steps.iter().map(|s| s.name.clone()).collect();
        if names.len() != steps.len() {
            return Err(BuildError::Validation("duplicate step in schedule".into()));
        }

        let mut orch = Orchestration {
            order: Vec::with_capacity(steps.len()),
            steps: HashMap::with_capacity(steps.len()),
            dependents: HashMap::new(),
            failures: FailureCollector::new(),
            started: Vec::new(),
            finished: Vec::new(),
        };
        let mut workers = FuturesUnordered::new();

        for step in steps {
            let remaining: HashSet<String> = step
                .dependencies
                .iter()
                .filter(|d| names.contains(*d) && **d != step.name)
                .cloned()
                .collect();
            for dep in &remaining {
                orch.dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(step.name.clone());
            }
            let ready = remaining.is_empty();
            let (gate, waiter) = Gate::new(ready);
            let handle = tokio::spawn(step.runner.run(waiter));
            let abort = handle.abort_handle();
            let name = step.name.clone();
            workers.push(async move { (name, handle.await) });

            if ready {
                orch.started.push(step.name.clone());
            }
            orch.order.push(step.name.clone());
            orch.steps.insert(
                step.name,
                StepState {
                    remaining,
                    gate,
                    abort,
                    outcome: if ready {
                        StepOutcome::Running
                    } else {
                        StepOutcome::Pending
                    },
                },
            );
        }

        info!(run_id = %run_id, steps = orch.order.len(), "Build phase started");
        let interrupt = self.interrupt.clone();
        let interrupted = async move {
            match interrupt {
                Some(token) => {
                    token.cancelled().await;
                    token.reason().unwrap_or_else(|| "cancelled".to_string())
                }
                None => std::future::pending().await,
            }
        };
        tokio::pin!(interrupted);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !workers.is_empty() {
            tokio::select! {
                biased;
                reason = &mut interrupted => {
                    warn!(run_id = %run_id, reason = %reason, "Build interrupted, aborting workers");
                    orch.abort_all();
                    while workers.next().await.is_some() {}
                    self.reporter.finish(&orch.snapshot());
                    return Err(BuildError::Interrupted(reason));
                }
                Some((name, joined)) = workers.next() => {
                    orch.complete(&name, joined);
                }
                _ = ticker.tick() => {
                    self.reporter.render(&orch.snapshot());
                }
            }
        }

        self.reporter.finish(&orch.snapshot());
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let outcomes = orch
            .steps
            .iter()
            .map(|(name, state)| (name.clone(), state.outcome))
            .collect();
        let report = BuildReport {
            run_id,
            outcomes,
            failures: orch.failures.into_records(),
            started: orch.started,
            finished: orch.finished,
            started_at,
            duration_ms,
        };
        info!(
            run_id = %run_id,
            success = report.success(),
            failed = report.failures.len(),
            duration_ms,
            "Build phase finished"
        );
        Ok(report)
    }
}
