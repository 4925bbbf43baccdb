//! Wake channels are the only platform-dependent piece of this crate: everything above them
//! ([`BinarySemaphore`](crate::BinarySemaphore), [`ConditionVariable`](crate::ConditionVariable)
//! and the events) is plain composition.

use crate::Result;
use std::time::Instant;

mod parking;
pub use parking::ParkingChannel;

#[cfg(all(
    unix,
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
))]
mod posix;
#[cfg(all(
    unix,
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
))]
pub use posix::PosixSemaphore;

/// The wake channel used when no backend is named explicitly.
#[cfg(all(
    feature = "native-semaphore",
    unix,
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
))]
pub type DefaultChannel = PosixSemaphore;

/// The wake channel used when no backend is named explicitly.
#[cfg(not(all(
    feature = "native-semaphore",
    unix,
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
)))]
pub type DefaultChannel = ParkingChannel;

/// A counting wake channel: every [`post()`](WakeChannel::post) lets exactly one past or
/// future [`wait()`](WakeChannel::wait) through.
///
/// Implementations carry no notion of ownership or over-release; that bookkeeping lives in
/// [`BinarySemaphore`](crate::BinarySemaphore), which only posts when it knows a thread is
/// registered to consume the wakeup.
pub trait WakeChannel: Send + Sync + Sized {
    /// Creates a channel with no pending wakeups.
    fn new() -> Result<Self>;

    /// Blocks until a wakeup is available and consumes it, returning `Ok(true)`. Returns
    /// `Ok(false)` if `deadline` passes first. `None` waits indefinitely.
    fn wait(&self, deadline: Option<Instant>) -> Result<bool>;

    /// Makes one wakeup available, releasing a blocked waiter if there is one.
    fn post(&self) -> Result<()>;
}
