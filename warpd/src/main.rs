use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "warpd",
    version,
    about = "Drive a simulated request loop through an adaptive throttle",
    long_about = "`warpd` runs a fixed number of simulated work units, asking a throttle before each one how long to wait.

It is meant for observing and tuning throttle settings: the summary shows the final sleep value and the rate that was actually achieved. With --store the throttle state is persisted to a JSON file, and a later run with the same --name and no explicit settings resumes from it.

EXAMPLE:
    # Hold a loop of 2ms work units to at most 100 iterations per second
    warpd --max-rate 100 --work 2ms --iterations 500 --summary"
)]
struct Args {
    // Throttle settings
    /// Throttle name, used as the storage key
    #[arg(long, value_name = "NAME", help_heading = "Throttle")]
    name: Option<String>,

    /// Initial sleep value in seconds (default: stored value, else 0.001)
    #[arg(long, value_name = "SECONDS", help_heading = "Throttle")]
    sleep: Option<f64>,

    /// Number of iterations between storage flushes (default: stored value, else 1000)
    #[arg(long, value_name = "N", help_heading = "Throttle")]
    interval: Option<u64>,

    /// Maximum iterations per second, 0 means no ceiling (default: stored value, else 0)
    #[arg(long, value_name = "N", help_heading = "Throttle")]
    max_rate: Option<u64>,

    /// Read throttle settings from a JSON file; command line flags take precedence
    #[arg(long, value_name = "PATH", help_heading = "Throttle")]
    config: Option<std::path::PathBuf>,

    /// JSON file to persist throttle state in; state is kept in memory if omitted
    #[arg(long, value_name = "PATH", help_heading = "Throttle")]
    store: Option<std::path::PathBuf>,

    // Workload
    /// Number of simulated work units
    #[arg(
        long,
        default_value = "100",
        value_name = "N",
        help_heading = "Workload"
    )]
    iterations: u64,

    /// Duration of each simulated work unit
    ///
    /// This option accepts a human readable duration, e.g. "500us", "2ms", "1s" etc.
    #[arg(
        long,
        default_value = "0s",
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        help_heading = "Workload"
    )]
    work: Duration,

    // Progress & output
    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,
}

impl Args {
    fn throttle_config(&self) -> common::ThrottleConfig {
        common::ThrottleConfig {
            name: self.name.clone(),
            sleep: self.sleep,
            interval: self.interval,
            max_rate: self.max_rate,
        }
    }
}

#[derive(Debug)]
struct Summary {
    name: String,
    iterations: u64,
    elapsed: Duration,
    slept: Duration,
    state: throttle::State,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let achieved = if self.elapsed.is_zero() {
            0.0
        } else {
            self.iterations as f64 / self.elapsed.as_secs_f64()
        };
        write!(
            f,
            "throttle: {}\n\
            iterations: {}\n\
            elapsed: {:?}\n\
            time slept: {:?}\n\
            achieved rate: {:.2}/s\n\
            {}",
            self.name, self.iterations, self.elapsed, self.slept, achieved, self.state
        )
    }
}

#[instrument]
async fn async_main(args: Args) -> Result<Summary> {
    let mut config = match &args.config {
        Some(path) => common::ThrottleConfig::load(path)?,
        None => common::ThrottleConfig::default(),
    };
    config = config.merge(args.throttle_config());
    config.validate()?;
    let storage: Arc<dyn throttle::Storage> = match &args.store {
        Some(path) => Arc::new(common::FileStorage::new(path)),
        None => Arc::new(throttle::MemoryStorage::empty()),
    };
    let mut throttle = config
        .builder()
        .storage(storage)
        .build()
        .context("failed to create throttle")?;
    tracing::info!(
        "running {} iterations through throttle {:?} (sleep={}, interval={}, max_rate={})",
        args.iterations,
        throttle.name(),
        throttle.state().sleep(),
        throttle.interval(),
        throttle.max_rate()
    );
    let start = std::time::Instant::now();
    let mut slept = Duration::ZERO;
    let mut scope = throttle.enter();
    for iteration in 0..args.iterations {
        slept += scope.pace().await.context("throttle failed")?;
        if !args.work.is_zero() {
            tokio::time::sleep(args.work).await;
        }
        tracing::trace!("iteration {} done, sleep={}", iteration, scope.state().sleep());
    }
    scope.exit().context("failed to persist final throttle state")?;
    Ok(Summary {
        name: throttle.name().to_string(),
        iterations: args.iterations,
        elapsed: start.elapsed(),
        slept,
        state: *throttle.state(),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary || args.verbose > 0,
    };
    let res = common::run(output, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
