use std::process::ExitCode;

use clap::Parser;
use ostree_cli::commands;
use ostree_cli::commands::Cli;

/// Renders an [`ostree_core::error::OstreeError`] the way §7/§11.4 mandate:
/// exactly one line on stderr, nothing on stdout, exit code 1.
fn report_error(error: ostree_core::error::OstreeError) -> ExitCode {
    eprintln!("error: {error}\n");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(e),
    }
}
