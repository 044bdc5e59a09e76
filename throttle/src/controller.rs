use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::state::State;
use crate::storage::{MemoryStorage, Snapshot, Storage};

pub const DEFAULT_NAME: &str = "default";
pub const DEFAULT_SLEEP: f64 = 0.001;
pub const DEFAULT_INTERVAL: u64 = 1000;
pub const DEFAULT_MAX_RATE: u64 = 0;

/// Gap (seconds) used in place of a measured gap of exactly zero.
pub const ZERO_GAP_EPSILON: f64 = 1e-4;

/// Hook computing the next sleep value from the current [`State`].
///
/// Only consulted when no max rate is set. Its return value becomes the new sleep value as-is.
pub type CalculateFn = Box<dyn FnMut(&State) -> anyhow::Result<f64> + Send>;

/// Configures and creates a [`Throttle`].
///
/// `sleep`, `interval` and `max_rate` that are not set here are looked up in the storage record
/// under the throttle's name, then fall back to the `DEFAULT_*` constants.
#[derive(Default)]
pub struct Builder {
    name: Option<String>,
    sleep: Option<f64>,
    interval: Option<u64>,
    max_rate: Option<u64>,
    calculate: Option<CalculateFn>,
    storage: Option<Arc<dyn Storage>>,
    clock: Option<Box<dyn Clock>>,
}

impl Builder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn sleep(mut self, sleep: f64) -> Self {
        self.sleep = Some(sleep);
        self
    }

    pub fn interval(mut self, interval: u64) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Calls-per-second ceiling. 0 disables it, which lets the calculation hook take over.
    pub fn max_rate(mut self, max_rate: u64) -> Self {
        self.max_rate = Some(max_rate);
        self
    }

    pub fn calculate<F>(mut self, calculate: F) -> Self
    where
        F: FnMut(&State) -> anyhow::Result<f64> + Send + 'static,
    {
        self.calculate = Some(Box::new(calculate));
        self
    }

    /// Store to resolve configuration from and to flush snapshots into. Defaults to a fresh
    /// [`MemoryStorage`].
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    #[instrument(skip_all, fields(name = self.name.as_deref().unwrap_or(DEFAULT_NAME)))]
    pub fn build(self) -> Result<Throttle> {
        let name = self.name.unwrap_or_else(|| DEFAULT_NAME.to_string());
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let stored = if self.sleep.is_some() && self.interval.is_some() && self.max_rate.is_some()
        {
            Snapshot::default()
        } else {
            storage.get_or(&name, Snapshot::default())?
        };
        let sleep = self.sleep.or(stored.sleep).unwrap_or(DEFAULT_SLEEP);
        let interval = self.interval.or(stored.interval).unwrap_or(DEFAULT_INTERVAL);
        let max_rate = self.max_rate.or(stored.max_rate).unwrap_or(DEFAULT_MAX_RATE);
        if !sleep.is_finite() || sleep < 0.0 {
            return Err(Error::Config(format!(
                "sleep must be a finite number of seconds >= 0, got {sleep}"
            )));
        }
        if interval == 0 {
            return Err(Error::Config("interval must be at least 1".to_string()));
        }
        // the max rate policy scales the previous sleep value, so it can never leave zero
        if sleep == 0.0 && max_rate != 0 {
            return Err(Error::Config(format!(
                "sleep must be greater than 0 when max_rate is set (max_rate={max_rate})"
            )));
        }
        debug!(
            "resolved throttle {:?}: sleep={}, interval={}, max_rate={}",
            name, sleep, interval, max_rate
        );
        Ok(Throttle {
            name,
            state: State::new(sleep, interval, max_rate),
            calculate: self.calculate,
            storage,
            clock: self.clock.unwrap_or_else(|| Box::new(SystemClock)),
            last_invocation: None,
            pending: 0,
            total: 0,
        })
    }
}

/// Adaptive throttle consulted before each unit of work.
///
/// Every call to [`sleep`](Self::sleep) measures the time since the previous call, derives the
/// next sleep value from it and returns that value. With a max rate set the value is scaled so
/// that the achieved rate converges on the ceiling; otherwise the calculation hook (if any)
/// decides. Every `interval` calls the state is flushed to storage.
pub struct Throttle {
    name: String,
    state: State,
    calculate: Option<CalculateFn>,
    storage: Arc<dyn Storage>,
    clock: Box<dyn Clock>,
    last_invocation: Option<Instant>,
    pending: u64,
    total: u64,
}

impl Throttle {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Throttle named [`DEFAULT_NAME`] backed by a fresh [`MemoryStorage`].
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn interval(&self) -> u64 {
        self.state.interval()
    }

    pub fn max_rate(&self) -> u64 {
        self.state.max_rate()
    }

    /// Invocations since the last flush to storage.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Invocations since creation.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Returns the number of seconds the caller should wait before its next unit of work.
    ///
    /// Errors from the calculation hook or from storage are returned unchanged; nothing is
    /// retried.
    pub fn sleep(&mut self) -> Result<f64> {
        self.calculate()?;
        self.checkpoint()?;
        Ok(self.state.sleep())
    }

    /// Like [`sleep`](Self::sleep), as a [`Duration`]. Negative or non-finite values (which a
    /// calculation hook may produce) become zero.
    pub fn sleep_duration(&mut self) -> Result<Duration> {
        Ok(to_duration(self.sleep()?))
    }

    /// Computes the next sleep value and waits it out on the tokio timer.
    pub async fn pace(&mut self) -> Result<Duration> {
        let delay = self.sleep_duration()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(delay)
    }

    /// Computes the next sleep value and blocks the current thread for it.
    pub fn pace_blocking(&mut self) -> Result<Duration> {
        let delay = self.sleep_duration()?;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(delay)
    }

    /// Counts one invocation and flushes a snapshot to storage once `interval` invocations have
    /// accumulated.
    ///
    /// If the save fails the pending count is kept, so the next invocation tries again.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.pending += 1;
        self.total += 1;
        self.state.set_update_count(self.total);
        if self.pending >= self.state.interval() {
            self.storage.save(&self.name, Snapshot::from(&self.state))?;
            debug!(
                "flushed throttle {:?} after {} invocations: sleep={}, rate={}",
                self.name,
                self.pending,
                self.state.sleep(),
                self.state.rate()
            );
            self.pending = 0;
        }
        Ok(())
    }

    fn calculate(&mut self) -> Result<()> {
        let now = self.clock.now();
        let Some(previous) = self.last_invocation.replace(now) else {
            trace!("throttle {:?}: first invocation, no baseline", self.name);
            return Ok(());
        };
        let mut gap = now.saturating_duration_since(previous).as_secs_f64();
        if gap == 0.0 {
            gap = ZERO_GAP_EPSILON;
        }
        self.state.record_gap(gap);
        if self.state.max_rate() != 0 {
            let previous_sleep = self.state.sleep();
            self.state
                .set_sleep((1.0 / (gap / previous_sleep)) / self.state.max_rate() as f64);
        } else if let Some(calculate) = self.calculate.as_mut() {
            let next = calculate(&self.state).map_err(Error::Calculate)?;
            self.state.set_sleep(next);
        }
        trace!(
            "throttle {:?}: gap={}, rate={}, delta={}, sleep={}",
            self.name,
            gap,
            self.state.rate(),
            self.state.delta(),
            self.state.sleep()
        );
        Ok(())
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("custom_calculate", &self.calculate.is_some())
            .field("pending", &self.pending)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

fn to_duration(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
