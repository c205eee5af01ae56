use std::fmt;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::secret::Secret;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
enum Arg {
    Plain(String),
    /// Rendered as `prefix***` in logs; passed as `prefix<value>` to the process.
    Secret { prefix: String, value: Secret<String> },
}

/// A subprocess command line whose `Display` form is safe to log.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<Arg>,
    capture: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            capture: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|a| Arg::Plain(a.into())));
        self
    }

    pub fn secret_arg(mut self, prefix: impl Into<String>, value: &Secret<String>) -> Self {
        self.args.push(Arg::Secret {
            prefix: prefix.into(),
            value: value.clone(),
        });
        self
    }

    /// Collect stdout instead of streaming it to the job log.
    pub fn capture_stdout(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn captures_stdout(&self) -> bool {
        self.capture
    }

    /// Arguments exactly as the child process receives them.
    pub fn exposed_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| match a {
                Arg::Plain(s) => s.clone(),
                Arg::Secret { prefix, value } => format!("{prefix}{}", value.expose()),
            })
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for a in &self.args {
            match a {
                Arg::Plain(s) => write!(f, " {s}")?,
                Arg::Secret { prefix, value } => write!(f, " {prefix}{value}")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Empty unless the invocation asked for capture.
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// The seam every subprocess call goes through.
pub trait CommandRunner {
    /// Run `invocation` to completion. A non-zero exit is not an error here.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunError>;
}

/// Runs commands on the host, inheriting stderr (and stdout unless captured).
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunError> {
        tracing::info!("[command]{invocation}");

        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.exposed_args()).stdin(Stdio::null());

        let spawn_err = |source| RunError::Spawn {
            program: invocation.program().to_string(),
            source,
        };

        if invocation.captures_stdout() {
            let output = cmd.stderr(Stdio::inherit()).output().map_err(spawn_err)?;
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            for line in stdout.lines() {
                tracing::info!("{line}");
            }
            Ok(CommandOutput {
                code: output.status.code(),
                stdout,
            })
        } else {
            let status = cmd.status().map_err(spawn_err)?;
            Ok(CommandOutput {
                code: status.code(),
                stdout: String::new(),
            })
        }
    }
}
