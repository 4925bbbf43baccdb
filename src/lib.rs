//! `semevent` provides events and condition variables that put waiting threads to sleep on
//! native binary semaphores instead of polling, and that remain usable in the child process
//! after `fork(2)`.
//!
//! The crate is built in three layers:
//!
//! * [`BinarySemaphore`]: a strictly binary (available/unavailable) semaphore with a timed,
//!   blocking acquire and a checked release that rejects over-release with [`Error::State`].
//!   Threads block on a [`WakeChannel`], an unnamed POSIX `sem_t` by default, with a portable
//!   `parking_lot_core` backend ([`ParkingChannel`]) elsewhere.
//! * [`ConditionVariable`]: a mutex plus one freshly created `BinarySemaphore` per waiting
//!   thread. [`ConditionVariable::notify_all()`] releases every registered semaphore, waking
//!   exactly the threads that were waiting when it was called.
//! * [`InterruptibleEvent`]: a settable/clearable flag guarded by a `ConditionVariable`,
//!   exposed through the [`Event`] trait (`is_set`, `set`, `clear`, `wait`). Its condition
//!   variable is rebuilt in a forked child, so the child can never inherit a held lock or
//!   phantom waiters.
//!
//! [`CondvarEvent`] implements the same [`Event`] contract directly atop a mutex and condition
//! variable, for callers who don't need fork safety.
//!
//! ```no_run
//! use semevent::{Event, EventState, InterruptibleEvent};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let ready = Arc::new(InterruptibleEvent::new(EventState::Unset));
//! let worker = {
//!     let ready = Arc::clone(&ready);
//!     std::thread::spawn(move || ready.wait_for(Duration::from_secs(5)))
//! };
//! ready.set()?;
//! assert!(worker.join().unwrap()?);
//! # Ok::<(), semevent::Error>(())
//! ```

mod channel;
mod condvar;
mod condvar_event;
mod error;
mod event;
#[cfg(all(unix, feature = "fork-guard"))]
mod fork;
mod semaphore;

pub use channel::{DefaultChannel, ParkingChannel, WakeChannel};
#[cfg(all(
    unix,
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
))]
pub use channel::PosixSemaphore;
pub use condvar::{ConditionGuard, ConditionVariable};
pub use condvar_event::CondvarEvent;
pub use error::{Error, Result};
pub use event::{Event, EventState, InterruptibleEvent};
pub use semaphore::BinarySemaphore;
