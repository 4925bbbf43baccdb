//! Post-fork reset of event state.
//!
//! After `fork(2)` the child is a single-threaded copy of the parent. Any mutex that some
//! other parent thread held at that instant stays locked forever in the child, and any waiter
//! semaphore belongs to a thread that no longer exists. Events therefore register here to have
//! their synchronization state rebuilt in the child before it can touch them.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Once, Weak};

/// Something whose state must be rebuilt in the child after a fork.
pub(crate) trait AfterFork: Send + Sync {
    /// # Safety
    ///
    /// Only called from the `pthread_atfork` child handler, when the forking thread is the
    /// only thread in the process and holds no borrow into `self`.
    unsafe fn reset_after_fork(&self);
}

struct Hook {
    id: u64,
    target: Weak<dyn AfterFork>,
}

static HOOKS: Mutex<Vec<Hook>> = parking_lot::const_mutex(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(0);
static INSTALL: Once = Once::new();

/// Keeps its target registered for post-fork reset for as long as it is alive.
pub(crate) struct ForkGuard {
    id: u64,
}

impl ForkGuard {
    pub(crate) fn register(target: Weak<dyn AfterFork>) -> ForkGuard {
        install();

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let mut hooks = HOOKS.lock();
        hooks.retain(|hook| hook.target.strong_count() > 0);
        hooks.push(Hook { id, target });
        tracing::debug!(id, registered = hooks.len(), "registered event for fork reset");

        ForkGuard { id }
    }
}

impl Drop for ForkGuard {
    fn drop(&mut self) {
        let mut hooks = HOOKS.lock();
        hooks.retain(|hook| hook.id != self.id);
        tracing::debug!(id = self.id, "unregistered event from fork reset");
    }
}

fn install() {
    INSTALL.call_once(|| {
        let rc = unsafe {
            libc::pthread_atfork(Some(before_fork), Some(after_fork_parent), Some(after_fork_child))
        };
        if rc == 0 {
            tracing::debug!("installed post-fork event reset handler");
        } else {
            tracing::warn!(
                error = %std::io::Error::from_raw_os_error(rc),
                "cannot install post-fork event reset handler"
            );
        }
    });
}

// Hold the hook list across the fork so the child never inherits it mid-update.
unsafe extern "C" fn before_fork() {
    std::mem::forget(HOOKS.lock());
}

unsafe extern "C" fn after_fork_parent() {
    HOOKS.force_unlock();
}

unsafe extern "C" fn after_fork_child() {
    // Still locked by before_fork(), on behalf of this very thread.
    reset_targets(&*HOOKS.data_ptr());
    HOOKS.force_unlock();
}

/// # Safety
///
/// See [`AfterFork::reset_after_fork()`].
unsafe fn reset_targets(hooks: &[Hook]) {
    for hook in hooks {
        if let Some(target) = hook.target.upgrade() {
            target.reset_after_fork();
        }
    }
}

#[cfg(test)]
pub(crate) fn registered_hooks() -> usize {
    HOOKS
        .lock()
        .iter()
        .filter(|hook| hook.target.strong_count() > 0)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Counter(AtomicUsize);

    impl AfterFork for Counter {
        unsafe fn reset_after_fork(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn is_registered(guard: &ForkGuard) -> bool {
        HOOKS.lock().iter().any(|hook| hook.id == guard.id)
    }

    #[test]
    fn guard_unregisters_on_drop() {
        let target: Arc<dyn AfterFork> = Arc::new(Counter(AtomicUsize::new(0)));
        let guard = ForkGuard::register(Arc::downgrade(&target));
        assert!(is_registered(&guard));

        let id = guard.id;
        drop(guard);
        assert!(!HOOKS.lock().iter().any(|hook| hook.id == id));
    }

    #[test]
    fn reset_skips_dropped_targets() {
        let live = Arc::new(Counter(AtomicUsize::new(0)));
        let dropped = Arc::new(Counter(AtomicUsize::new(0)));
        let hooks = vec![
            Hook {
                id: 0,
                target: Arc::downgrade(&(live.clone() as Arc<dyn AfterFork>)),
            },
            Hook {
                id: 1,
                target: Arc::downgrade(&(dropped.clone() as Arc<dyn AfterFork>)),
            },
        ];
        drop(dropped);

        unsafe { reset_targets(&hooks) };
        assert_eq!(1, live.0.load(Ordering::Relaxed));
        assert_eq!(0, hooks[1].target.strong_count());
    }

    #[test]
    fn parent_handler_releases_hook_list() {
        unsafe { before_fork() };
        assert!(HOOKS.try_lock().is_none());
        unsafe { after_fork_parent() };
        drop(HOOKS.lock());
    }
}
