//! Tracing subscriber setup for warpd binaries.

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

use crate::config::OutputConfig;

/// Default filter directive for the given output settings. `RUST_LOG` overrides it.
pub fn default_directive(output: &OutputConfig) -> &'static str {
    if output.quiet {
        return "off";
    }
    match output.verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs a stderr fmt subscriber. Fails if a global subscriber is already set.
pub fn init(output: &OutputConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(output)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}
