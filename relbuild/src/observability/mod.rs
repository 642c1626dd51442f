//! Observability utilities.

mod logging;

pub use logging::{init_json_logging, init_logging, StepTimer};
