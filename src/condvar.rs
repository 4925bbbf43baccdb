use crate::channel::{DefaultChannel, WakeChannel};
use crate::{BinarySemaphore, Error, Result};
use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

type Waiter<C> = Arc<BinarySemaphore<C>>;

/// A condition variable that pairs its own mutex with a set of per-waiter
/// [`BinarySemaphore`]s.
///
/// Every thread blocked in [`wait()`](Self::wait) sleeps on a semaphore of its own, registered
/// in the waiter set while the mutex is still held, so a [`notify_all()`](Self::notify_all)
/// issued after the waiter releases the mutex always finds (and releases) that semaphore.
/// Nothing polls: a waiter consumes no CPU until it is notified or its timeout expires.
///
/// The mutex is held through a [`ConditionGuard`] (see [`lock()`](Self::lock)), whose
/// `wait()` and `notify_all()` are the safe entry points. The condition variable's own
/// `wait()` and `notify_all()` are `unsafe`: they can be called by the guard's owner while the
/// guard is alive, and only verify that the mutex is locked by someone.
pub struct ConditionVariable<C: WakeChannel = DefaultChannel> {
    lock: RawMutex,
    // Only accessed with `lock` held.
    waiters: UnsafeCell<Vec<Waiter<C>>>,
}

unsafe impl<C: WakeChannel> Send for ConditionVariable<C> {}
unsafe impl<C: WakeChannel> Sync for ConditionVariable<C> {}

impl<C: WakeChannel> ConditionVariable<C> {
    /// Create a new, unlocked `ConditionVariable` with no waiters.
    pub const fn new() -> Self {
        Self {
            lock: RawMutex::INIT,
            waiters: UnsafeCell::new(Vec::new()),
        }
    }

    /// Acquire the associated mutex, blocking until it is available. The mutex is not
    /// reentrant: locking it again from the same thread deadlocks.
    pub fn lock(&self) -> ConditionGuard<'_, C> {
        self.lock.lock();
        ConditionGuard::new(self)
    }

    /// Attempt to acquire the associated mutex without blocking.
    pub fn try_lock(&self) -> Option<ConditionGuard<'_, C>> {
        if self.lock.try_lock() {
            Some(ConditionGuard::new(self))
        } else {
            None
        }
    }

    /// Whether the associated mutex is currently held by any thread.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Block the calling thread until another thread calls [`notify_all()`](Self::notify_all),
    /// or until `timeout` elapses. The associated mutex is released while blocked and is held
    /// again when this returns. Returns `Ok(true)` if notified, `Ok(false)` on timeout.
    ///
    /// Fails with [`Error::Usage`] if the mutex is not locked. Prefer [`ConditionGuard::wait()`],
    /// which needs no such check.
    ///
    /// # Safety
    ///
    /// If the mutex is locked, the calling thread must be the one holding its live
    /// [`ConditionGuard`]. The `Usage` check only proves the mutex is held by *some* thread;
    /// calling this from any other thread races on the waiter set and unlocks a mutex the
    /// caller does not own.
    pub unsafe fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        if !self.is_locked() {
            return Err(Error::Usage { op: "wait" });
        }
        self.wait_locked(timeout)
    }

    /// Wake every thread currently blocked in [`wait()`](Self::wait). Threads that start
    /// waiting after this call returns are not affected.
    ///
    /// Fails with [`Error::Usage`] if the mutex is not locked.
    ///
    /// # Safety
    ///
    /// Same as for [`wait()`](Self::wait): while the mutex is locked, only the thread holding
    /// its live [`ConditionGuard`] may call this. [`ConditionGuard::notify_all()`] is the safe form.
    pub unsafe fn notify_all(&self) -> Result<()> {
        if !self.is_locked() {
            return Err(Error::Usage { op: "notify" });
        }
        self.notify_all_locked()
    }

    /// # Safety
    ///
    /// The calling thread must hold `self.lock`.
    unsafe fn wait_locked(&self, timeout: Option<Duration>) -> Result<bool> {
        let waiter: Waiter<C> = Arc::new(BinarySemaphore::new_locked()?);
        (*self.waiters.get()).push(Arc::clone(&waiter));

        self.lock.unlock();
        let acquired = waiter.acquire(timeout);
        self.lock.lock();

        match acquired {
            Ok(true) => Ok(true),
            Ok(false) => {
                // A notify_all() that ran between our timeout and relocking has already taken
                // us out of the set (releasing a semaphore nobody will acquire again).
                Ok(!self.remove_waiter(&waiter))
            }
            Err(err) => {
                self.remove_waiter(&waiter);
                Err(err)
            }
        }
    }

    /// Removes `waiter` from the set, returning whether it was still registered.
    ///
    /// # Safety
    ///
    /// The calling thread must hold `self.lock`.
    unsafe fn remove_waiter(&self, waiter: &Waiter<C>) -> bool {
        let waiters = &mut *self.waiters.get();
        match waiters.iter().position(|w| Arc::ptr_eq(w, waiter)) {
            Some(idx) => {
                waiters.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// # Safety
    ///
    /// The calling thread must hold `self.lock`.
    unsafe fn notify_all_locked(&self) -> Result<()> {
        let mut result = Ok(());
        for waiter in (*self.waiters.get()).drain(..) {
            // Keep going so one broken waiter can't strand the others.
            if let Err(err) = waiter.release() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

impl<C: WakeChannel> Default for ConditionVariable<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the mutex of a [`ConditionVariable`] is held. Unlocks it when dropped.
pub struct ConditionGuard<'a, C: WakeChannel = DefaultChannel> {
    cond: &'a ConditionVariable<C>,
    // The mutex must be unlocked by the thread that locked it.
    _not_send: PhantomData<*const ()>,
}

impl<'a, C: WakeChannel> ConditionGuard<'a, C> {
    fn new(cond: &'a ConditionVariable<C>) -> Self {
        Self {
            cond,
            _not_send: PhantomData,
        }
    }

    /// See [`ConditionVariable::wait()`]. The guard stays valid across the call: the mutex is
    /// held again by the time this returns, whether notified or timed out.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<bool> {
        unsafe { self.cond.wait_locked(timeout) }
    }

    /// See [`ConditionVariable::notify_all()`].
    pub fn notify_all(&mut self) -> Result<()> {
        unsafe { self.cond.notify_all_locked() }
    }

    /// The number of threads currently registered as waiting.
    pub fn waiter_count(&self) -> usize {
        unsafe { (*self.cond.waiters.get()).len() }
    }
}

impl<C: WakeChannel> Drop for ConditionGuard<'_, C> {
    fn drop(&mut self) {
        unsafe { self.cond.lock.unlock() }
    }
}
