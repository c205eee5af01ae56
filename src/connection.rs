use thiserror::Error;

use crate::process::{CommandRunner, Invocation, RunError};

/// Printed by `cm checkconnection` when the configured server answers.
pub const SUCCESS_MARKER: &str = "Test connection executed successfully";

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("connection check did not succeed (exit code {code:?})")]
    NotConnected { code: Option<i32> },
}

pub struct ConnectionTester<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ConnectionTester<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Succeeds only on a zero exit whose stdout contains [`SUCCESS_MARKER`].
    pub fn test(&self) -> Result<(), ConnectionError> {
        let out = self
            .runner
            .run(&Invocation::new("cm").arg("checkconnection").capture_stdout())?;
        if out.success() && out.stdout.contains(SUCCESS_MARKER) {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected { code: out.code })
        }
    }
}
