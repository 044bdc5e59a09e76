//! Adaptive self-throttling for request loops
//!
//! A [`Throttle`] is consulted before each unit of work (an outbound request, a batch write, ...)
//! and answers with the number of seconds to wait. It measures the gap since the previous call
//! and adjusts its answer so the caller's effective rate converges on a target.
//!
//! # Calculation policies
//!
//! Exactly one policy applies on each call, in this order:
//!
//! 1. **Max rate** - with a non-zero `max_rate` the next sleep value is
//!
//!    ```text
//!    sleep' = sleep / (gap * max_rate)
//!    ```
//!
//!    which grows the delay while calls arrive faster than `max_rate` per second and shrinks it
//!    while they arrive slower. A calculation hook, if one was supplied, is ignored.
//! 2. **Calculation hook** - with `max_rate` at 0, a user function receives the current
//!    [`State`] (rate and delta already updated) and returns the new sleep value.
//! 3. **Fixed** - with neither, the sleep value never changes.
//!
//! The first call has no previous call to measure against and returns the initial sleep value.
//!
//! # Persistence
//!
//! Every `interval` calls the throttle writes a [`Snapshot`] of its state to a [`Storage`] under
//! its name. A throttle created later with the same name and no explicit configuration resumes
//! from that snapshot. Storage is a checkpoint of the last known state, not a coordination
//! mechanism: two processes sharing a store do not limit each other.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use throttle::{MemoryStorage, Throttle};
//!
//! # fn send_request() -> anyhow::Result<()> { Ok(()) }
//! # fn main() -> anyhow::Result<()> {
//! let storage = Arc::new(MemoryStorage::empty());
//! let mut throttle = Throttle::builder()
//!     .name("api.example.com")
//!     .max_rate(50)
//!     .interval(100)
//!     .storage(storage)
//!     .build()?;
//!
//! throttle.scoped(|throttle| -> anyhow::Result<()> {
//!     for _ in 0..1000 {
//!         throttle.pace_blocking()?;
//!         send_request()?;
//!     }
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! A throttle is driven from one place at a time (`sleep` takes `&mut self`). It is `Send`, so it
//! can move between threads or tasks. Storage is shared through an `Arc` and may back several
//! throttles with distinct names.

mod clock;
mod controller;
mod error;
mod scope;
mod state;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    Builder, CalculateFn, DEFAULT_INTERVAL, DEFAULT_MAX_RATE, DEFAULT_NAME, DEFAULT_SLEEP,
    Throttle, ZERO_GAP_EPSILON,
};
pub use error::{Error, Result, StorageError};
pub use scope::Scope;
pub use state::State;
pub use storage::{EXAMPLE_ENTRY, MemoryStorage, Snapshot, Storage};
