//! Scoped use of a throttle with a guaranteed final checkpoint.

use tracing::error;

use crate::controller::Throttle;
use crate::error::{Error, Result};

/// Guard returned by [`Throttle::enter`].
///
/// Derefs to the throttle. Leaving the scope runs one more [`Throttle::checkpoint`] so the last
/// measurements reach storage even if no further `sleep` call follows. Call [`exit`](Self::exit)
/// to see whether that checkpoint succeeded; when the guard is simply dropped (early return, `?`)
/// a failure can only be logged.
#[must_use = "dropping the scope immediately checkpoints the throttle"]
pub struct Scope<'a> {
    throttle: &'a mut Throttle,
    closed: bool,
}

impl Scope<'_> {
    pub fn exit(mut self) -> Result<()> {
        self.closed = true;
        self.throttle.checkpoint()
    }
}

impl std::ops::Deref for Scope<'_> {
    type Target = Throttle;

    fn deref(&self) -> &Throttle {
        self.throttle
    }
}

impl std::ops::DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Throttle {
        self.throttle
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(error) = self.throttle.checkpoint() {
            error!(
                "final checkpoint of throttle {:?} failed: {:#}",
                self.throttle.name(),
                error
            );
        }
    }
}

impl Throttle {
    pub fn enter(&mut self) -> Scope<'_> {
        Scope {
            throttle: self,
            closed: false,
        }
    }

    /// Runs `body` inside a [`Scope`].
    ///
    /// The final checkpoint runs whether `body` succeeds or fails. An error from `body` is
    /// returned as-is; a checkpoint failure is returned only when `body` succeeded, otherwise it
    /// is logged.
    ///
    /// ```
    /// use throttle::Throttle;
    ///
    /// let mut throttle = Throttle::builder().interval(3).build()?;
    /// throttle.scoped(|inner| -> Result<(), throttle::Error> {
    ///     for _ in 0..2 {
    ///         inner.sleep()?;
    ///     }
    ///     Ok(())
    /// })?;
    /// // two sleeps plus the exit checkpoint complete one interval
    /// assert_eq!(throttle.pending(), 0);
    /// # Ok::<(), throttle::Error>(())
    /// ```
    pub fn scoped<T, E, F>(&mut self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Throttle) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut scope = self.enter();
        match body(&mut *scope) {
            Ok(value) => {
                scope.exit()?;
                Ok(value)
            }
            Err(body_error) => {
                if let Err(error) = scope.exit() {
                    error!("final checkpoint failed after scope error: {:#}", error);
                }
                Err(body_error)
            }
        }
    }
}
