//! Build execution.
//!
//! This module provides:
//! - Per-step runners that extract sources and invoke build actions
//! - A dependency-gated scheduler with cascading cancellation
//! - Failure records and log-tail reporting
//! - The [`Builder`] façade and the [`Builds`] registry

mod builder;
mod builds;
mod failure;
mod gate;
mod runner;
mod scheduler;


pub use builder::{BuildOutput, Builder, INTERPRETER_STEP};
pub use builds::Builds;
pub use failure::{collect_log_tails, format_log_tail, FailureCollector, FailureRecord};
pub use gate::{Gate, GateWaiter};
pub use runner::{BuildPlan, EnvHook, StepRunner};
pub use scheduler::{BuildReport, ScheduledStep, Scheduler};
