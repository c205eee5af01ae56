use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// `<strong>Version:</strong>11.0.16.8101` on the vendor download page.
static DOWNLOAD_PAGE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<strong>Version:\s*</strong>\s*(\d+\.\d+\.\d+\.\d+)").expect("static pattern")
});

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("`{0}` is not a version of the form major.minor.patch.build")]
    Invalid(String),
    #[error("failed to fetch version metadata: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("failed to parse a version from the metadata response")]
    Parse,
}

/// A fully-specified `major.minor.patch.build` version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteVersion(String);

impl ConcreteVersion {
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let parts: Vec<&str> = s.split('.').collect();
        let numeric = |p: &&str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if parts.len() == 4 && parts.iter().all(numeric) {
            Ok(Self(s.to_string()))
        } else {
            Err(VersionError::Invalid(s.to_string()))
        }
    }
}

impl fmt::Display for ConcreteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Latest,
    Exact(ConcreteVersion),
}

impl VersionSpec {
    /// `latest` (any case) or a concrete four-component version.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("latest") {
            Ok(Self::Latest)
        } else {
            ConcreteVersion::parse(s).map(Self::Exact)
        }
    }

    /// Pin down `Latest` through `resolver`; exact versions pass through untouched.
    pub fn to_concrete(
        &self,
        resolver: &VersionResolver<'_>,
    ) -> Result<ConcreteVersion, VersionError> {
        match self {
            Self::Exact(v) => Ok(v.clone()),
            Self::Latest => resolver.resolve(),
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Exact(v) => fmt::Display::fmt(v, f),
        }
    }
}

#[derive(Deserialize)]
struct VersionMetadata {
    version: String,
}

/// Looks up the newest published client version. Nothing is cached.
pub struct VersionResolver<'a> {
    client: &'a reqwest::blocking::Client,
    url: &'a str,
}

impl<'a> VersionResolver<'a> {
    pub fn new(client: &'a reqwest::blocking::Client, url: &'a str) -> Self {
        Self { client, url }
    }

    pub fn resolve(&self) -> Result<ConcreteVersion, VersionError> {
        tracing::info!("Getting latest version...");
        let body = self.client.get(self.url).send()?.error_for_status()?.text()?;
        let version = parse_version_metadata(&body)?;
        tracing::info!("Latest version: {version}");
        Ok(version)
    }
}

/// Accept `{"version": "..."}`, falling back to scraping the download page.
fn parse_version_metadata(body: &str) -> Result<ConcreteVersion, VersionError> {
    if let Ok(meta) = serde_json::from_str::<VersionMetadata>(body) {
        return ConcreteVersion::parse(meta.version.trim()).map_err(|_| VersionError::Parse);
    }
    DOWNLOAD_PAGE_VERSION
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| ConcreteVersion(m.as_str().to_string()))
        .ok_or(VersionError::Parse)
}
