//! Step registry.

use super::action::BuildAction;
use crate::download::Download;
use crate::errors::{BuildError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// A named unit of build work.
#[derive(Debug, Clone)]
pub struct Recipe {
    /// Unique step name.
    pub name: String,
    /// The build action.
    pub action: Arc<dyn BuildAction>,
    /// Names of the steps that must succeed first, without duplicates.
    pub dependencies: Vec<String>,
    /// Archive to fetch and extract before the action runs.
    pub download: Option<Download>,
}

impl Recipe {
    /// Creates a recipe with no dependencies or download.
    #[must_use]
    pub fn new(name: impl Into<String>, action: Arc<dyn BuildAction>) -> Self {
        Self {
            name: name.into(),
            action,
            dependencies: Vec::new(),
            download: None,
        }
    }

    /// Adds dependencies, ignoring repeats.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    /// Sets the download.
    #[must_use]
    pub fn with_download(mut self, download: Download) -> Self {
        self.download = Some(download);
        self
    }
}

/// Declarative mapping from step name to recipe. Holds no execution state.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    recipes: HashMap<String, Recipe>,
    order: Vec<String>,
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a recipe. Names are unique and a step may not depend on itself.
    pub fn register(&mut self, recipe: Recipe) -> Result<()> {
        if self.recipes.contains_key(&recipe.name) {
            return Err(BuildError::Validation(format!(
                "Step '{}' is already registered",
                recipe.name
            )));
        }
        if recipe.dependencies.contains(&recipe.name) {
            return Err(BuildError::Validation(format!(
                "Step '{}' cannot depend on itself",
                recipe.name
            )));
        }
        self.order.push(recipe.name.clone());
        self.recipes.insert(recipe.name.clone(), recipe);
        Ok(())
    }

    /// Replaces the download of a registered step.
    pub fn with_download(mut self, name: &str, download: Download) -> Result<Self> {
        let recipe = self
            .recipes
            .get_mut(name)
            .ok_or_else(|| BuildError::UnknownStep(name.to_string()))?;
        recipe.download = Some(download);
        Ok(self)
    }

    /// Looks up a recipe.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Recipe> {
        self.recipes.get(name)
    }

    /// Step names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of registered steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no step is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolves a requested subset, or every step when `None`. Repeats are
    /// dropped; unknown names are an error.
    pub fn resolve(&self, steps: Option<&[String]>) -> Result<Vec<String>> {
        let Some(steps) = steps else {
            return Ok(self.order.clone());
        };
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(steps.len());
        for step in steps {
            if !self.recipes.contains_key(step) {
                return Err(BuildError::UnknownStep(step.clone()));
            }
            if seen.insert(step.as_str()) {
                resolved.push(step.clone());
            }
        }
        Ok(resolved)
    }

    /// Downloads configured for the given steps.
    #[must_use]
    pub fn downloads_for(&self, steps: &[String]) -> Vec<Download> {
        steps
            .iter()
            .filter_map(|s| self.recipes.get(s))
            .filter_map(|r| r.download.clone())
            .collect()
    }

    /// Checks that the graph is acyclic. Dependencies on steps that were
    /// never registered are logged and ignored, like any dependency outside
    /// the scheduled set.
    pub fn validate(&self) -> Result<()> {
        for (name, dep) in self.unknown_dependencies() {
            warn!(step = %name, dependency = %dep, "Ignoring dependency on unregistered step");
        }
        self.detect_cycles()
    }

    /// `(step, dependency)` pairs naming unregistered steps.
    #[must_use]
    pub fn unknown_dependencies(&self) -> Vec<(&str, &str)> {
        self.order
            .iter()
            .filter_map(|name| self.recipes.get(name))
            .flat_map(|recipe| {
                recipe
                    .dependencies
                    .iter()
                    .filter(|dep| !self.recipes.contains_key(*dep))
                    .map(move |dep| (recipe.name.as_str(), dep.as_str()))
            })
            .collect()
    }

    fn detect_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.order {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(BuildError::Validation(format!(
                        "Dependency cycle: {}",
                        cycle.join(" -> ")
                    )));
                }
            }
        }
        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(recipe) = self.recipes.get(node) {
            for dep in recipe.dependencies.iter().filter(|d| self.recipes.contains_key(*d)) {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}
