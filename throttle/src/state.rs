/// Measurement and decision state of one throttle.
///
/// Only the owning [`Throttle`](crate::Throttle) mutates it; everyone else, including the
/// calculation hook, sees it through a shared borrow and the getters below.
///
/// `sleep`, `rate` and `delta` only carry measured values after the second call to
/// [`Throttle::sleep`](crate::Throttle::sleep); the first call has no baseline to measure against.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct State {
    sleep: f64,
    interval: u64,
    max_rate: u64,
    delta: f64,
    rate: f64,
    update_count: u64,
}

impl State {
    pub(crate) fn new(sleep: f64, interval: u64, max_rate: u64) -> Self {
        Self {
            sleep,
            interval,
            max_rate,
            delta: 0.0,
            rate: 0.0,
            update_count: 0,
        }
    }

    /// Current recommended delay, in seconds.
    pub fn sleep(&self) -> f64 {
        self.sleep
    }

    /// Number of invocations between storage flushes.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Calls-per-second ceiling; 0 means no ceiling.
    pub fn max_rate(&self) -> u64 {
        self.max_rate
    }

    /// Last measured gap minus the sleep value that was in effect for it.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Last measured calls per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Bookkeeping passes since the throttle was created. Never reset.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub(crate) fn record_gap(&mut self, gap: f64) {
        self.rate = 1.0 / gap;
        self.delta = gap - self.sleep;
    }

    pub(crate) fn set_sleep(&mut self, sleep: f64) {
        self.sleep = sleep;
    }

    pub(crate) fn set_update_count(&mut self, count: u64) {
        self.update_count = count;
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "sleep: {:.6}s\n\
            rate: {:.2}/s\n\
            delta: {:.6}s\n\
            interval: {}\n\
            max rate: {}\n\
            updates: {}",
            self.sleep, self.rate, self.delta, self.interval, self.max_rate, self.update_count
        )
    }
}
