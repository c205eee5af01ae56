use thiserror::Error;

use crate::actions;
use crate::config::{ActionConfig, INPUT_PROJECT_ID};
use crate::configure::{ConfigureError, Configurator};
use crate::connection::ConnectionTester;
use crate::exchange::{CredentialExchange, ExchangeError};
use crate::install::{
    backend_for, EnvDelta, InstallContext, InstallError, Platform, UnsupportedPlatform,
};
use crate::process::{CommandRunner, Invocation};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    UnsupportedPlatform(#[from] UnsupportedPlatform),
    #[error("input required and not supplied: {0}")]
    MissingInput(&'static str),
    #[error("authentication failed: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("configuration failed: {0}")]
    Configure(#[from] ConfigureError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The client already reached the server; no credentials were used.
    AlreadyConnected,
    Configured { organization: String },
}

/// probe → install-if-absent → re-probe → test → exchange → configure → re-test.
pub struct Orchestrator<'a> {
    config: ActionConfig,
    runner: &'a dyn CommandRunner,
    http: reqwest::blocking::Client,
    os: String,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: ActionConfig,
        runner: &'a dyn CommandRunner,
        http: reqwest::blocking::Client,
    ) -> Self {
        Self {
            config,
            runner,
            http,
            os: std::env::consts::OS.to_string(),
        }
    }

    /// Override the detected OS name.
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    pub fn run(self) -> Result<Outcome, PipelineError> {
        if !self.client_present() {
            tracing::info!("cm not found, installing");
            match self.install() {
                Ok(delta) => apply_env_delta(&delta),
                Err(InstallAttemptError::Fatal(e)) => return Err(e),
                Err(InstallAttemptError::Install(e)) => {
                    tracing::warn!("installation failed: {e}");
                    actions::warning(&format!("Failed to install cm: {e}"));
                }
            }
            if !self.client_present() {
                tracing::error!("Failed to call cm command after installation");
                actions::warning("Failed to call cm command after installation");
            }
        }

        let tester = ConnectionTester::new(self.runner);
        match tester.test() {
            Ok(()) => {
                tracing::info!("cm is already connected");
                return Ok(Outcome::AlreadyConnected);
            }
            Err(e) => tracing::info!("cm is not connected ({e}), authenticating"),
        }

        let project_id = self
            .config
            .project_id
            .as_deref()
            .ok_or(PipelineError::MissingInput(INPUT_PROJECT_ID))?;
        let login = CredentialExchange::new(&self.http, &self.config.endpoints).run(
            project_id,
            self.config.credentials,
            self.config.organization.as_deref(),
        )?;
        Configurator::new(self.runner).configure(&login)?;

        tracing::info!("cm configured for {}", login.organization);
        Ok(Outcome::Configured {
            organization: login.organization,
        })
    }

    fn client_present(&self) -> bool {
        match self.runner.run(&Invocation::new("cm").arg("version")) {
            Ok(out) => out.success(),
            Err(e) => {
                tracing::debug!("{e}");
                false
            }
        }
    }

    fn install(&self) -> Result<EnvDelta, InstallAttemptError> {
        let platform =
            Platform::from_os(&self.os).map_err(|e| InstallAttemptError::Fatal(e.into()))?;
        tracing::info!("Installing cm {} for {platform}", self.config.version);

        let backend = backend_for(
            platform,
            InstallContext {
                runner: self.runner,
                http: &self.http,
                endpoints: &self.config.endpoints,
                staging_dir: &self.config.staging_dir,
            },
        );
        backend
            .install(&self.config.version)
            .map_err(InstallAttemptError::Install)
    }
}

/// Installation problems are survivable; an unknown platform is not.
enum InstallAttemptError {
    Fatal(PipelineError),
    Install(InstallError),
}

/// Make `delta` visible to this process and to later steps of the job.
fn apply_env_delta(delta: &EnvDelta) {
    if delta.is_empty() {
        return;
    }
    let current = std::env::var_os("PATH").unwrap_or_default();
    let mut paths: Vec<_> = delta.path_entries.clone();
    paths.extend(std::env::split_paths(&current));
    match std::env::join_paths(paths) {
        Ok(joined) => std::env::set_var("PATH", joined),
        Err(e) => tracing::warn!("could not extend PATH: {e}"),
    }
    for dir in &delta.path_entries {
        tracing::info!("Adding {} to PATH", dir.display());
        if let Err(e) = actions::add_path(dir) {
            tracing::warn!("could not record {} for later steps: {e}", dir.display());
        }
    }
}
