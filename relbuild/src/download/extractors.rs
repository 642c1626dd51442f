//! Version extractors for listing pages.
//!
//! Each function maps one hyperlink target to a version string, or `None`
//! when the link is not a release.

use once_cell::sync::Lazy;
use regex::Regex;

static KRB_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d\.\d\d/$").expect("Invalid krb directory regex"));
static PYTHON_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+\.)+\d+/$").expect("Invalid python directory regex"));

/// `name-1.2.3.tar.gz` → `1.2.3`. Links to a `latest` tarball are ignored.
pub fn tarball_version(href: &str) -> Option<String> {
    let stem = href.strip_suffix(".tar.gz")?;
    let file = stem.rsplit('/').next().unwrap_or(stem);
    let (_, version) = file.split_once('-')?;
    (version != "latest" && !version.is_empty()).then(|| version.to_string())
}

/// `releaselog/3_40_1.html` → `3400100`.
pub fn sqlite_version(href: &str) -> Option<String> {
    if !href.contains("releaselog") {
        return None;
    }
    let page = href.rsplit('/').next()?.strip_suffix(".html")?;
    let parts: Vec<u32> = page
        .split('_')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [major, minor, patch] => Some(format!("{major}{minor:02}{patch:02}00")),
        [major, minor] => Some(format!("{major}{minor:02}0000")),
        _ => None,
    }
}

/// `…/releases/tag/v1.2.3` → `1.2.3`.
pub fn github_version(href: &str) -> Option<String> {
    if !href.contains("tag/") {
        return None;
    }
    href.rsplit_once("/v").map(|(_, v)| v.to_string())
}

/// `1.20/` → `1.20`.
pub fn krb_version(href: &str) -> Option<String> {
    KRB_DIR
        .is_match(href)
        .then(|| href.trim_end_matches('/').to_string())
}

/// `3.10.9/` → `3.10.9`.
pub fn python_version(href: &str) -> Option<String> {
    PYTHON_DIR
        .is_match(href)
        .then(|| href.trim_end_matches('/').to_string())
}

/// `…/libuuid-1.0.3.tar.gz/download` → `1.0.3`.
pub fn uuid_version(href: &str) -> Option<String> {
    if !href.contains("download") || href.contains("latest") {
        return None;
    }
    let tarball = href.strip_suffix("/download")?.strip_suffix(".tar.gz")?;
    let file = tarball.rsplit('/').next()?;
    Some(file.replace("libuuid-", ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tarball_version() {
        assert_eq!(tarball_version("zlib-1.3.tar.gz").as_deref(), Some("1.3"));
        assert_eq!(tarball_version("/pub/xz-5.4.1.tar.gz").as_deref(), Some("5.4.1"));
        assert_eq!(tarball_version("zlib-latest.tar.gz"), None);
        assert_eq!(tarball_version("zlib-1.3.tar.xz"), None);
        assert_eq!(tarball_version("README.tar.gz"), None);
    }

    #[test]
    fn test_sqlite_version() {
        assert_eq!(sqlite_version("releaselog/3_40_1.html").as_deref(), Some("3400100"));
        assert_eq!(sqlite_version("releaselog/3_9.html").as_deref(), Some("3090000"));
        assert_eq!(sqlite_version("releaselog/notes.html"), None);
        assert_eq!(sqlite_version("index.html"), None);
    }

    #[test]
    fn test_github_version() {
        assert_eq!(
            github_version("/libffi/libffi/releases/tag/v3.4.4").as_deref(),
            Some("3.4.4")
        );
        assert_eq!(github_version("/libffi/libffi/releases"), None);
    }

    #[test]
    fn test_directory_versions() {
        assert_eq!(krb_version("1.20/").as_deref(), Some("1.20"));
        assert_eq!(krb_version("1.2/"), None);
        assert_eq!(python_version("3.10.9/").as_deref(), Some("3.10.9"));
        assert_eq!(python_version("3.10.10/").as_deref(), Some("3.10.10"));
        assert_eq!(python_version("bogus/"), None);
        assert_eq!(python_version("../"), None);
    }

    #[test]
    fn test_uuid_version() {
        assert_eq!(
            uuid_version("https://sourceforge.net/projects/libuuid/files/libuuid-1.0.3.tar.gz/download")
                .as_deref(),
            Some("1.0.3")
        );
        assert_eq!(uuid_version("/projects/libuuid/files/latest/download"), None);
    }
}
