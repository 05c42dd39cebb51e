//! gwdeps CLI binary.

use anyhow::Result;
use gateway_deps::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the gwdeps CLI.
fn main() -> Result<()> {
    // Can be controlled via RUST_LOG environment variable
    // Example: RUST_LOG=gateway_deps=debug gwdeps dependencies service:s-1
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gateway_deps=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting gwdeps CLI");

    let cli = Cli::parse_args();
    cli.execute()?;

    tracing::debug!("gwdeps CLI completed successfully");
    Ok(())
}
