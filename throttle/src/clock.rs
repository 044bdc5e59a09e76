//! Time sources for the throttle.
//!
//! The throttle only ever measures the gap between two of its own calls, so it reads a
//! monotonic [`Instant`] rather than wall-clock time.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// Monotonic system clock. The default for every throttle.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to a throttle and keep another to
/// advance it:
///
/// ```
/// use std::time::Duration;
/// use throttle::{ManualClock, Throttle};
///
/// let clock = ManualClock::new();
/// let mut throttle = Throttle::builder().clock(clock.clone()).build()?;
/// throttle.sleep()?;
/// clock.advance(Duration::from_millis(10));
/// throttle.sleep()?;
/// assert!((throttle.state().rate() - 100.0).abs() < 1e-6);
/// # Ok::<(), throttle::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn set(&self, instant: Instant) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
