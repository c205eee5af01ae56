use std::path::PathBuf;
use thiserror::Error;

use crate::secret::Secret;
use crate::version::VersionSpec;

pub const INPUT_VERSION: &str = "version";
pub const INPUT_PROJECT_ID: &str = "unity-cloud-project-id";
pub const INPUT_CREDENTIALS: &str = "unity-service-account-credentials";
pub const INPUT_ORGANIZATION: &str = "uvcs-organization";

#[derive(Debug)]
pub struct ActionConfig {
    pub version: VersionSpec,
    pub project_id: Option<String>, // required only once the exchange path runs
    pub credentials: ServiceAccountCredential,
    pub organization: Option<String>, // explicit override, skips organization lookup
    pub staging_dir: PathBuf, // RUNNER_TEMP (or a cache dir off-runner)
    pub endpoints: Endpoints,
}

/// Service-account key pair, as supplied in `<key>:<secret>` form.
#[derive(Debug)]
pub struct ServiceAccountCredential {
    pub key: String,
    pub secret: Secret<String>,
}

impl ServiceAccountCredential {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (key, secret) = raw
            .split_once(':')
            .filter(|(k, s)| !k.is_empty() && !s.is_empty())
            .ok_or(ConfigError::MalformedCredentials)?;
        Ok(Self {
            key: key.to_string(),
            secret: Secret::masked(secret),
        })
    }
}

/// Remote hosts the step talks to. Overridable for mirrors and tests.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub download_base: String, // {base}/{version}/plasticscm/{os}/cloudedition
    pub version_url: String,
    pub apt_repo: String,
    pub identity_url: String, // ?projectId= is appended
    pub cloud_api: String, // hosts the SCM-token exchange and organization listing
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            download_base: "https://www.plasticscm.com/download/downloadinstaller".to_string(),
            version_url: "https://www.plasticscm.com/download".to_string(),
            apt_repo: "https://www.plasticscm.com/plasticrepo/stable/debian".to_string(),
            identity_url: "https://services.api.unity.com/auth/v1/token-exchange".to_string(),
            cloud_api: "https://cloud.plasticscm.com/api".to_string(),
        }
    }
}

impl Endpoints {
    fn from_env() -> Self {
        let mut e = Self::default();
        let overrides: [(&str, &mut String); 5] = [
            ("SETUP_UVCS_DOWNLOAD_URL", &mut e.download_base),
            ("SETUP_UVCS_VERSION_URL", &mut e.version_url),
            ("SETUP_UVCS_APT_REPO_URL", &mut e.apt_repo),
            ("SETUP_UVCS_IDENTITY_URL", &mut e.identity_url),
            ("SETUP_UVCS_CLOUD_URL", &mut e.cloud_api),
        ];
        for (var, slot) in overrides {
            if let Ok(v) = std::env::var(var) {
                if !v.trim().is_empty() {
                    *slot = v.trim().trim_end_matches('/').to_string();
                }
            }
        }
        e
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("input required and not supplied: {0}")]
    MissingInput(&'static str),
    #[error("{INPUT_CREDENTIALS} must be in the form <key>:<secret>")]
    MalformedCredentials,
    #[error("invalid {INPUT_VERSION} input: {0}")]
    InvalidVersion(#[from] crate::version::VersionError),
}

/// Step inputs arrive as `INPUT_<NAME>` with the name upper-cased, dashes kept.
fn input(name: &str) -> Option<String> {
    let var = format!("INPUT_{}", name.to_uppercase());
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn action_config() -> Result<ActionConfig, ConfigError> {
    let version = VersionSpec::parse(input(INPUT_VERSION).as_deref().unwrap_or("latest"))?;

    let raw_credentials =
        input(INPUT_CREDENTIALS).ok_or(ConfigError::MissingInput(INPUT_CREDENTIALS))?;
    crate::actions::add_mask(&raw_credentials);
    let credentials = ServiceAccountCredential::parse(&raw_credentials)?;

    let staging_dir = match std::env::var("RUNNER_TEMP") {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => dirs::cache_dir()
            .map(|d| d.join("setup-uvcs"))
            .unwrap_or_else(std::env::temp_dir),
    };

    Ok(ActionConfig {
        version,
        project_id: input(INPUT_PROJECT_ID),
        credentials,
        organization: input(INPUT_ORGANIZATION),
        staging_dir,
        endpoints: Endpoints::from_env(),
    })
}

// Serialize env-var tests to prevent interference between parallel test threads.
// Shared with every test module that reads or writes the process environment.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
