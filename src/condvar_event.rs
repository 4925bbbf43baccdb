use crate::{Event, EventState, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// An [`Event`] built directly on a mutex and a condition variable rather than on per-waiter
/// semaphores.
///
/// It honors the same contract as [`InterruptibleEvent`](crate::InterruptibleEvent) but keeps
/// no waiter set of its own and is *not* reset after `fork(2)`: a child forked while another
/// thread held its lock will deadlock on it.
pub struct CondvarEvent {
    flag: AtomicBool,
    /// Number of `set()` calls so far, so a waiter woken by a `set()` that was immediately
    /// followed by a `clear()` still reports the wakeup.
    sets: Mutex<u64>,
    cond: Condvar,
}

impl CondvarEvent {
    /// Create a new `CondvarEvent` in the given initial state.
    pub const fn new(state: EventState) -> Self {
        Self {
            flag: AtomicBool::new(matches!(state, EventState::Set)),
            sets: parking_lot::const_mutex(0),
            cond: Condvar::new(),
        }
    }
}

impl Event for CondvarEvent {
    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn set(&self) -> Result<()> {
        let mut sets = self.sets.lock();
        *sets = sets.wrapping_add(1);
        self.flag.store(true, Ordering::Relaxed);
        self.cond.notify_all();
        Ok(())
    }

    fn clear(&self) {
        let _sets = self.sets.lock();
        self.flag.store(false, Ordering::Relaxed);
    }

    /// Spurious condvar wakeups are absorbed here; this only returns `Ok(false)` if the timeout
    /// elapsed without the event being set.
    fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut sets = self.sets.lock();
        let seen = *sets;
        while !self.flag.load(Ordering::Relaxed) && *sets == seen {
            match deadline {
                None => self.cond.wait(&mut sets),
                Some(deadline) => {
                    if self.cond.wait_until(&mut sets, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        Ok(self.flag.load(Ordering::Relaxed) || *sets != seen)
    }
}

impl Default for CondvarEvent {
    fn default() -> Self {
        Self::new(EventState::Unset)
    }
}

impl fmt::Debug for CondvarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondvarEvent")
            .field("is_set", &self.is_set())
            .finish()
    }
}
