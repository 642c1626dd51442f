//! Newer-version discovery from directory listing pages.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

static LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Invalid link selector"));

/// Extracts every non-empty `href` of an `<a>` element.
pub fn parse_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Num(u64),
    Text(String),
}

/// Best-effort ordering: runs of digits compare numerically, runs of letters
/// lexically. A number never compares against text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LooseVersion {
    components: Vec<Component>,
}

impl LooseVersion {
    /// Splits `text` into numeric and alphabetic components.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut components = Vec::new();
        let mut chars = text.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                let mut run = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    run.push(d);
                    chars.next();
                }
                match run.parse() {
                    Ok(n) => components.push(Component::Num(n)),
                    Err(_) => components.push(Component::Text(run)),
                }
            } else if c.is_alphabetic() {
                let mut run = String::new();
                while let Some(&a) = chars.peek().filter(|a| a.is_alphabetic()) {
                    run.push(a);
                    chars.next();
                }
                components.push(Component::Text(run.to_lowercase()));
            } else {
                chars.next();
            }
        }
        Self { components }
    }

    /// Compares two versions, or `None` when a number meets text.
    #[must_use]
    pub fn try_cmp(&self, other: &Self) -> Option<Ordering> {
        for (a, b) in self.components.iter().zip(&other.components) {
            let ord = match (a, b) {
                (Component::Num(x), Component::Num(y)) => x.cmp(y),
                (Component::Text(x), Component::Text(y)) => x.cmp(y),
                _ => return None,
            };
            if ord != Ordering::Equal {
                return Some(ord);
            }
        }
        Some(self.components.len().cmp(&other.components.len()))
    }
}

/// A version compared strictly as semver when possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseVersion {
    /// Parsed as semantic version.
    Strict(semver::Version),
    /// Best-effort components.
    Loose(LooseVersion),
}

impl ReleaseVersion {
    /// Parses strictly, falling back to loose.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        semver::Version::parse(text)
            .map_or_else(|_| Self::Loose(LooseVersion::parse(text)), Self::Strict)
    }

    fn loose(text: &str) -> Self {
        Self::Loose(LooseVersion::parse(text))
    }
}

/// Orders `candidate` against `current`. Strict ordering is used only when both
/// parse strictly.
#[must_use]
pub fn compare(current: &str, candidate: &str) -> Option<Ordering> {
    let (cur, cand) = match (ReleaseVersion::parse(current), ReleaseVersion::parse(candidate)) {
        (ReleaseVersion::Strict(a), ReleaseVersion::Strict(b)) => return Some(b.cmp(&a)),
        _ => (ReleaseVersion::loose(current), ReleaseVersion::loose(candidate)),
    };
    match (cur, cand) {
        (ReleaseVersion::Loose(a), ReleaseVersion::Loose(b)) => b.try_cmp(&a),
        _ => None,
    }
}

/// Outcome of a newer-version check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReport {
    /// The pinned version.
    pub current: String,
    /// Discovered versions strictly greater than `current`.
    pub newer: Vec<String>,
    /// Discovered versions that could not be ordered against `current`.
    pub incomparable: Vec<String>,
}

impl VersionReport {
    /// Whether an update is available.
    #[must_use]
    pub fn has_newer(&self) -> bool {
        !self.newer.is_empty()
    }
}

/// Classifies each candidate against `current`. Duplicates are reported once.
#[must_use]
pub fn compare_versions(current: &str, candidates: &[String]) -> VersionReport {
    let mut report = VersionReport {
        current: current.to_string(),
        ..VersionReport::default()
    };
    for candidate in candidates {
        if report.newer.contains(candidate) || report.incomparable.contains(candidate) {
            continue;
        }
        match compare(current, candidate) {
            Some(Ordering::Greater) => report.newer.push(candidate.clone()),
            Some(_) => {}
            None => report.incomparable.push(candidate.clone()),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_newer_and_bogus() {
        let report = compare_versions("3.10.9", &strings(&["3.10.9", "3.10.10", "bogus"]));
        assert_eq!(report.newer, strings(&["3.10.10"]));
        assert_eq!(report.incomparable, strings(&["bogus"]));
        assert!(report.has_newer());
    }

    #[test]
    fn test_loose_fallback_for_two_component_versions() {
        let report = compare_versions("1.20", &strings(&["1.19", "1.21", "1.20"]));
        assert_eq!(report.newer, strings(&["1.21"]));
        assert!(report.incomparable.is_empty());
    }

    #[test]
    fn test_loose_when_only_candidate_is_strict() {
        assert_eq!(compare("1.2", "1.2.1"), Some(Ordering::Greater));
        assert_eq!(compare("3.4.4", "3.4"), Some(Ordering::Less));
    }

    #[test]
    fn test_loose_numeric_not_lexical() {
        let a = LooseVersion::parse("1.9");
        let b = LooseVersion::parse("1.10");
        assert_eq!(a.try_cmp(&b), Some(Ordering::Less));
        assert_eq!(
            LooseVersion::parse("1.0a").try_cmp(&LooseVersion::parse("1.0b")),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_parse_links() {
        let html = r#"<html><body>
            <a href="../">../</a>
            <a href="3.10.9/">3.10.9/</a>
            <a>no target</a>
            <a href="">empty</a>
        </body></html>"#;
        assert_eq!(parse_links(html), strings(&["../", "3.10.9/"]));
    }
}
