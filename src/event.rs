use crate::{ConditionVariable, Result};
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(all(unix, feature = "fork-guard"))]
use crate::fork::{AfterFork, ForkGuard};

/// The state of an [`Event`], which can either be `Set` (i.e. signalled, ready) or `Unset`
/// (i.e. not ready).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventState {
    /// Calls to [`Event::wait()`] go through without blocking.
    Set,
    /// Calls to [`Event::wait()`] block until the event becomes set.
    Unset,
}

/// An `Event` is a waitable boolean: once [`set()`](Event::set), every thread blocked in
/// [`wait()`](Event::wait) is released and later waiters go straight through, until the event
/// is [`clear()`](Event::clear)ed again.
pub trait Event {
    /// Returns the current state of the flag without taking any lock. The answer may already
    /// be stale by the time the caller looks at it.
    fn is_set(&self) -> bool;

    /// Set the event, waking all current waiters. The event stays set until cleared.
    fn set(&self) -> Result<()>;

    /// Put the event back in the unset state. Nobody is woken.
    fn clear(&self);

    /// Return immediately with `Ok(true)` if the event is set, otherwise block until it is set
    /// or until `timeout` elapses (never, if `None`). Returns `Ok(false)` on timeout.
    fn wait(&self, timeout: Option<Duration>) -> Result<bool>;

    /// Block for at most `limit` waiting for the event to be set.
    fn wait_for(&self, limit: Duration) -> Result<bool> {
        self.wait(Some(limit))
    }

    /// Block until the event is set.
    fn wait_forever(&self) -> Result<()> {
        self.wait(None).map(|_| ())
    }
}

pub(crate) struct EventInner {
    flag: AtomicBool,
    // Replaced wholesale in a forked child; see `reset_after_fork()`.
    cond: UnsafeCell<ConditionVariable>,
}

unsafe impl Send for EventInner {}
unsafe impl Sync for EventInner {}

impl EventInner {
    fn cond(&self) -> &ConditionVariable {
        unsafe { &*self.cond.get() }
    }
}

#[cfg(all(unix, feature = "fork-guard"))]
impl AfterFork for EventInner {
    unsafe fn reset_after_fork(&self) {
        // Whatever state the mutex was in and whichever threads were parked on the waiter
        // semaphores, none of it exists in the child. Dropping the old waiter set only
        // decrements the Arcs the vanished threads still own.
        drop(std::ptr::replace(self.cond.get(), ConditionVariable::new()));
    }
}

/// An event whose waiters block on per-waiter native semaphores rather than polling, and
/// which keeps working in the child process after `fork(2)`.
///
/// All flag updates happen under the mutex of an internal [`ConditionVariable`]:
/// [`set()`](Event::set) raises the flag and notifies every waiter in the same critical
/// section, so no waiter that checked the flag before the `set()` can miss its wakeup. Only
/// [`is_set()`](Event::is_set) reads the flag without the lock.
///
/// With the `fork-guard` feature (on by default) each event registers itself to have its
/// condition variable rebuilt in a forked child: the child starts with an unlocked mutex and
/// no waiters, while the flag keeps the value it had at the time of the fork.
pub struct InterruptibleEvent {
    inner: Arc<EventInner>,
    #[cfg(all(unix, feature = "fork-guard"))]
    _fork_guard: ForkGuard,
}

impl InterruptibleEvent {
    /// Create a new `InterruptibleEvent` in the given initial state.
    pub fn new(state: EventState) -> Self {
        let inner = Arc::new(EventInner {
            flag: AtomicBool::new(state == EventState::Set),
            cond: UnsafeCell::new(ConditionVariable::new()),
        });

        #[cfg(all(unix, feature = "fork-guard"))]
        let _fork_guard = {
            let hook: Arc<dyn AfterFork> = inner.clone();
            ForkGuard::register(Arc::downgrade(&hook))
        };

        Self {
            inner,
            #[cfg(all(unix, feature = "fork-guard"))]
            _fork_guard,
        }
    }

    #[cfg(test)]
    pub(crate) fn cond(&self) -> &ConditionVariable {
        self.inner.cond()
    }
}

impl Event for InterruptibleEvent {
    fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::Relaxed)
    }

    /// Raises the flag and wakes every thread blocked in [`wait()`](Event::wait), all under the
    /// event's lock.
    fn set(&self) -> Result<()> {
        let mut guard = self.inner.cond().lock();
        self.inner.flag.store(true, Ordering::Relaxed);
        guard.notify_all()
    }

    fn clear(&self) {
        let _guard = self.inner.cond().lock();
        self.inner.flag.store(false, Ordering::Relaxed);
    }

    /// Checks the flag under the event's lock and returns at once if it is set, without
    /// registering a waiter. Otherwise blocks on a fresh semaphore until the next
    /// [`set()`](Event::set) or the timeout.
    fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        let mut guard = self.inner.cond().lock();
        if self.inner.flag.load(Ordering::Relaxed) {
            return Ok(true);
        }
        guard.wait(timeout)
    }
}

impl Default for InterruptibleEvent {
    fn default() -> Self {
        Self::new(EventState::Unset)
    }
}

impl fmt::Debug for InterruptibleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptibleEvent")
            .field("is_set", &self.is_set())
            .finish()
    }
}
