//! Build recipes.
//!
//! A recipe pairs a step name with a [`BuildAction`], its dependencies and an
//! optional [`Download`](crate::download::Download). Recipes are registered in
//! a [`StepRegistry`] and never change while a build runs.

mod action;
mod defaults;
mod env;
mod registry;

pub use action::{run_logged, BuildAction, FnAction};
pub use defaults::{ConfigureMake, OpenSslBuild, SqliteBuild};
pub use env::{major_version, BuildEnv, ENV_PREFIX};
pub use registry::{Recipe, StepRegistry};
