use thiserror::Error;

use crate::connection::{ConnectionError, ConnectionTester};
use crate::exchange::CloudLogin;
use crate::process::{CommandRunner, Invocation, RunError};

const WORKING_MODE: &str = "SSOWorkingMode";

#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("`cm configure` failed with exit code {0:?}")]
    Rejected(Option<i32>),
    /// Configuration was applied but the client still cannot reach the server.
    #[error("connection check failed after configuring the client: {0}")]
    Verification(#[source] ConnectionError),
}

/// `{organization}@cloud`
pub fn server_address(organization: &str) -> String {
    format!("{organization}@cloud")
}

pub struct Configurator<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Configurator<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Write the SSO profile into the client's own configuration, then confirm it connects.
    pub fn configure(&self, login: &CloudLogin) -> Result<(), ConfigureError> {
        let server = server_address(&login.organization);
        tracing::info!("Configuring client for {server}");

        let invocation = Invocation::new("cm")
            .arg("configure")
            .arg(format!("--workingmode={WORKING_MODE}"))
            .arg(format!("--server={server}"))
            .secret_arg("--user=", &login.credential.username)
            .secret_arg("--token=", &login.credential.token);
        let out = self.runner.run(&invocation)?;
        if !out.success() {
            return Err(ConfigureError::Rejected(out.code));
        }

        ConnectionTester::new(self.runner)
            .test()
            .map_err(ConfigureError::Verification)
    }
}
