use std::ffi::OsString;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{child_args, Cli, Command};
use crate::core::model::IsolationConfig;
use crate::platform::linux::process;

/// Dispatch a parsed CLI command and return the process exit code.
pub fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run { isolation, cmd } => cmd_run(isolation.into(), &cmd, cli.verbose),
        Command::Child { isolation, cmd } => cmd_child(isolation.into(), &cmd),
    }
}

// ─── run ────────────────────────────────────────────────────────────────────

fn cmd_run(config: IsolationConfig, cmd: &[OsString], verbose: u8) -> Result<i32> {
    let rootfs = process::validate_rootfs(&config.rootfs)?;
    let config = IsolationConfig { rootfs, ..config };
    info!(rootfs = %config.rootfs.display(), command = ?cmd, "launching");

    let argv = child_args(&config, cmd, verbose);
    let code = process::launch(&config, &argv).context("failed to launch isolated context")?;
    Ok(code)
}

// ─── child ──────────────────────────────────────────────────────────────────

fn cmd_child(config: IsolationConfig, cmd: &[OsString]) -> Result<i32> {
    info!(pid = std::process::id(), command = ?cmd, "entering isolated context");
    let code = process::enter(&config, cmd)?;
    Ok(code)
}
