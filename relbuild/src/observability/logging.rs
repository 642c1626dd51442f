//! Subscriber installation and step timing.
//!
//! Relbuild only emits `tracing` events; installing a subscriber is left to
//! the embedding program. These helpers cover the common cases.

use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs a human-readable subscriber. `RUST_LOG` wins over
/// `default_directive`. Returns false if a global subscriber already exists.
pub fn init_logging(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_directive))
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Installs a JSON subscriber, one object per event.
pub fn init_json_logging(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_directive))
        .with_current_span(false)
        .try_init()
        .is_ok()
}

/// Wall-clock timer for a step or phase.
#[derive(Debug)]
pub struct StepTimer {
    start: Instant,
    name: String,
}

impl StepTimer {
    /// Starts timing.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Milliseconds since start.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The timed step.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the timer, logging and returning the duration.
    pub fn finish(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(step = %self.name, duration_ms, "Timer finished");
        duration_ms
    }
}
