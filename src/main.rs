#[cfg(not(target_os = "linux"))]
compile_error!("nsbox needs Linux namespaces");

mod cli;
mod core;
mod platform;

use std::io::IsTerminal;
use std::process;

use tracing_subscriber::EnvFilter;

use crate::core::error::{Error, EXIT_INTERNAL};

/// Environment variable holding a tracing filter directive, e.g. `nsbox=debug`.
const LOG_ENV: &str = "NSBOX_LOG";

fn main() {
    let args = cli::parse();
    init_tracing(args.verbose);

    let code = match cli::commands::dispatch(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("nsbox: {e:#}");
            e.downcast_ref::<Error>()
                .map_or(EXIT_INTERNAL, Error::exit_code)
        }
    };
    process::exit(code);
}

/// Log to stderr; stdout belongs to the isolated command.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}
