//! Operator interruption.
//!
//! This module provides:
//! - CancellationToken, shared between the caller and the scheduler

mod token;

pub use token::CancellationToken;
