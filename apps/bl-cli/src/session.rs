use crate::config::SessionConfig;
use anyhow::{Context, Result};
use std::process::Command;
use tracing::info;

pub const ENVIRONMENT_VAR: &str = "BLUESKY_ENVIRONMENT";
pub const STARTUP_MODULE_VAR: &str = "STARTUP_MODULE";

pub fn command(cfg: &SessionConfig) -> Command {
    let mut cmd = Command::new(&cfg.program);
    cmd.args(cfg.command_args())
        .env(ENVIRONMENT_VAR, &cfg.environment)
        .env(STARTUP_MODULE_VAR, &cfg.startup_module);
    cmd
}

/// Run the interactive session in the foreground and return its exit code.
pub fn run(cfg: &SessionConfig) -> Result<i32> {
    info!(
        program = %cfg.program,
        environment = %cfg.environment,
        module = %cfg.startup_module,
        "starting session"
    );
    let status = command(cfg)
        .status()
        .with_context(|| format!("starting `{}`", cfg.program))?;
    // killed by a signal: no code
    Ok(status.code().unwrap_or(1))
}
