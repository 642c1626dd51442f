//! Core types for relbuild.
//!
//! This module contains the fundamental types used throughout relbuild:
//! - Step outcomes
//! - Platforms and target triplets

mod status;
mod triplet;

pub use status::StepOutcome;
pub use triplet::{Platform, Triplet};
