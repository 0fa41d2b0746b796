//! s3tk - S3 reconciliation and bulk-transfer toolkit
//!
//! Sync, move, copy, split and download objects across S3 prefixes.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

use commands::{Commands, GlobalArgs};

/// S3 reconciliation and bulk-transfer toolkit
#[derive(Parser, Debug)]
#[command(name = "s3tk", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    commands::execute(cli.command, cli.global).await.into()
}
