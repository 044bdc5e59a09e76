//! Host-side support for warpd throttles
//!
//! The `throttle` crate holds the feedback loop itself. This crate holds what a program embedding
//! it usually needs around it:
//!
//! - [`storage::FileStorage`] - a JSON file store so throttle state survives restarts
//! - [`config::ThrottleConfig`] - throttle settings loadable from JSON and mergeable with flags
//! - [`logging::init`] - tracing subscriber setup driven by [`config::OutputConfig`]
//! - [`run`] - runtime, logging and summary/error reporting around a binary's async main

pub mod config;
pub mod logging;
pub mod storage;

pub use config::{ConfigError, OutputConfig, ThrottleConfig};
pub use storage::FileStorage;

/// Runs `func` on a single threaded tokio runtime with logging set up from `output`.
///
/// Prints the summary to stdout when `output.print_summary` is set; logs the error chain if `func`
/// fails. Returns `None` if anything failed.
pub fn run<Fut, Summary>(output: OutputConfig, func: impl FnOnce() -> Fut) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    if let Err(error) = logging::init(&output) {
        if !output.quiet {
            eprintln!("{error:#}");
        }
        return None;
    }
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to build tokio runtime: {error}");
            }
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            // quiet mode turns the subscriber off, which silences this too
            tracing::error!("{:#}", error);
            None
        }
    }
}
