//! microdeploy - single-VM deployments through a CPI plugin

use clap::Parser;
use tracing_subscriber::EnvFilter;

use microdeploy_cli::cli::Cli;

/// Environment variable holding the log filter, e.g. `debug` or `microdeploy_cli=trace`.
const LOG_ENV: &str = "MICRODEPLOY_LOG";

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
