// main.rs — logging setup and orchestration only.
// All I/O lives in the modules below; the orchestrator sequences them.
mod actions;
mod config;
mod configure;
mod connection;
mod download;
mod exchange;
mod install;
mod orchestrator;
mod process;
mod secret;
mod version;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use config::action_config;
use orchestrator::{Orchestrator, Outcome};
use process::SystemRunner;

/// `SETUP_UVCS_LOG` wins; otherwise `debug` when the runner has debug logging on.
fn init_logging() {
    let default = if std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1") {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_env("SETUP_UVCS_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run() -> anyhow::Result<Outcome> {
    let config = action_config()?;
    let http = reqwest::blocking::Client::builder()
        .user_agent(format!("setup-uvcs/{}", env!("CARGO_PKG_VERSION")))
        .build()?;
    let outcome = Orchestrator::new(config, &SystemRunner, http).run()?;
    Ok(outcome)
}

fn main() -> ExitCode {
    init_logging();

    match run() {
        Ok(Outcome::AlreadyConnected) => {
            tracing::info!("Unity Version Control client is ready");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Configured { organization }) => {
            tracing::info!("Unity Version Control client is ready ({organization}@cloud)");
            ExitCode::SUCCESS
        }
        Err(e) => {
            // Single terminal signal for the job; `{:#}` keeps the whole cause chain.
            actions::set_failed(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
