//! Registry of configured builders.

use super::builder::Builder;
use crate::core::Platform;
use std::collections::{BTreeMap, HashMap};

/// Builders keyed by platform, then interpreter version.
#[derive(Debug, Clone, Default)]
pub struct Builds {
    builds: HashMap<Platform, BTreeMap<String, Builder>>,
}

impl Builds {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a builder under its own version, replacing any previous one.
    pub fn add(&mut self, platform: Platform, builder: Builder) -> Option<Builder> {
        self.builds
            .entry(platform)
            .or_default()
            .insert(builder.version().to_string(), builder)
    }

    /// Looks up a builder.
    #[must_use]
    pub fn get(&self, platform: Platform, version: &str) -> Option<&Builder> {
        self.builds.get(&platform)?.get(version)
    }

    /// Mutable lookup, e.g. to retarget the architecture.
    pub fn get_mut(&mut self, platform: Platform, version: &str) -> Option<&mut Builder> {
        self.builds.get_mut(&platform)?.get_mut(version)
    }

    /// Versions registered for a platform, in ascending string order.
    #[must_use]
    pub fn versions(&self, platform: Platform) -> Vec<&str> {
        self.builds
            .get(&platform)
            .map(|by_version| by_version.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestWorkspace;

    #[test]
    fn test_keyed_by_platform_and_version() {
        let ws = TestWorkspace::new();
        let base = Builder::new(ws.config.clone()).unwrap();
        let newer = base.with_version("3.11.4", None).unwrap();

        let mut builds = Builds::new();
        assert!(builds.add(Platform::Linux, base).is_none());
        builds.add(Platform::Linux, newer);

        assert_eq!(builds.versions(Platform::Linux), vec!["3.10.9", "3.11.4"]);
        assert!(builds.versions(Platform::MacOs).is_empty());
        assert_eq!(builds.get(Platform::Linux, "3.11.4").unwrap().version(), "3.11.4");
        assert!(builds.get(Platform::Windows, "3.10.9").is_none());

        builds.get_mut(Platform::Linux, "3.10.9").unwrap().set_arch("aarch64");
        assert_eq!(builds.get(Platform::Linux, "3.10.9").unwrap().triplet().arch(), "aarch64");
    }
}
