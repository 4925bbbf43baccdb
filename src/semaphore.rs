use crate::channel::{DefaultChannel, WakeChannel};
use crate::{Error, Result};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::time::{Duration, Instant};

const AVAILABLE: isize = 1;
const UNAVAILABLE: isize = 0;

/// A strictly binary semaphore: a resource that is either available or not, with a blocking
/// (optionally timed) [`acquire()`](Self::acquire) and a checked [`release()`](Self::release).
///
/// Unlike a counting semaphore, releasing a `BinarySemaphore` that is already available when
/// no thread is waiting to acquire it is treated as a mismatched acquire/release pair and
/// fails with [`Error::State`] rather than banking a second credit.
///
/// Blocked acquirers sleep on the wake channel `C` (a native POSIX semaphore by default) and
/// are woken one at a time, each `release()` handing the resource to exactly one of them.
pub struct BinarySemaphore<C: WakeChannel = DefaultChannel> {
    /// `1` when available, `0` when unavailable and uncontended, `-n` when unavailable with
    /// `n` acquirers registered on the channel.
    count: AtomicIsize,
    channel: C,
}

impl<C: WakeChannel> BinarySemaphore<C> {
    /// Create a new, available `BinarySemaphore`.
    pub fn new() -> Result<Self> {
        Self::with_count(AVAILABLE)
    }

    /// Create a new `BinarySemaphore` that is already held, so that the first call to
    /// [`acquire()`](Self::acquire) blocks until someone calls [`release()`](Self::release).
    pub fn new_locked() -> Result<Self> {
        Self::with_count(UNAVAILABLE)
    }

    fn with_count(count: isize) -> Result<Self> {
        Ok(Self {
            count: AtomicIsize::new(count),
            channel: C::new()?,
        })
    }

    /// Attempts to take the semaphore without blocking. Returns true upon success.
    pub fn try_acquire(&self) -> bool {
        self.count
            .compare_exchange(AVAILABLE, UNAVAILABLE, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Take the semaphore, blocking for at most `timeout` (or indefinitely if `None`) while it
    /// is unavailable.
    ///
    /// Returns `Ok(true)` if the semaphore was acquired and `Ok(false)` if the timeout elapsed
    /// first. A `release()` that races the expiry of the timeout is never lost: either this
    /// call observes it and returns `true`, or it is left for the next acquirer.
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<bool> {
        if self.try_acquire() {
            return Ok(true);
        }
        if timeout == Some(Duration::ZERO) {
            return Ok(false);
        }

        // An unrepresentable deadline is as good as no deadline at all.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        if self.count.fetch_sub(1, Ordering::AcqRel) == AVAILABLE {
            // Released between try_acquire() and registering ourselves.
            return Ok(true);
        }

        match self.channel.wait(deadline) {
            Ok(true) => Ok(true),
            Ok(false) => self.withdraw(),
            Err(err) => {
                // Leave the count consistent before surfacing the failure.
                self.withdraw()?;
                Err(err)
            }
        }
    }

    /// Undo the registration of an acquirer whose wait ended without a wakeup. If a release
    /// has already handed the resource to us, the matching post is (or is about to be) on the
    /// channel and we consume it instead.
    fn withdraw(&self) -> Result<bool> {
        let mut count = self.count.load(Ordering::Acquire);
        loop {
            if count >= UNAVAILABLE {
                tracing::trace!("semaphore released at timeout expiry, taking the hand-off");
                return self.channel.wait(None);
            }
            match self.count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::trace!("semaphore acquire timed out");
                    return Ok(false);
                }
                Err(current) => count = current,
            }
        }
    }

    /// Release the semaphore, waking one blocked acquirer if there is one or otherwise leaving
    /// the semaphore available for the next caller of [`acquire()`](Self::acquire).
    ///
    /// Fails with [`Error::State`] if the semaphore is already available and nobody is waiting
    /// on it.
    pub fn release(&self) -> Result<()> {
        let mut count = self.count.load(Ordering::Acquire);
        loop {
            if count >= AVAILABLE {
                return Err(Error::State);
            }
            match self.count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => count = current,
            }
        }

        if count < UNAVAILABLE {
            // Hand off directly to one registered acquirer.
            self.channel.post()?;
        }
        Ok(())
    }

    /// Whether the semaphore could be acquired without blocking at the time of the call.
    /// Only a snapshot: it may change before the caller acts on it.
    pub fn is_available(&self) -> bool {
        self.count.load(Ordering::Relaxed) == AVAILABLE
    }

    #[cfg(test)]
    pub(crate) fn registered_acquirers(&self) -> usize {
        let count = self.count.load(Ordering::Acquire);
        if count < UNAVAILABLE {
            count.unsigned_abs()
        } else {
            0
        }
    }
}
