use std::io;

/// Errors raised by the primitives in this crate.
///
/// None of these are transient: [`Error::State`] and [`Error::Usage`] indicate a logic bug
/// in the caller, and [`Error::Os`] means the native primitive itself misbehaved. A timed
/// out wait is not an error and is reported as `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A [`BinarySemaphore`](crate::BinarySemaphore) was released while already available
    /// with no acquirer waiting to take the credit, i.e. acquire/release calls are mismatched.
    #[error("release of unlocked primitive")]
    State,
    /// A [`ConditionVariable`](crate::ConditionVariable) operation was attempted without
    /// its associated lock being held.
    #[error("cannot {op} on un-acquired lock")]
    Usage { op: &'static str },
    /// The underlying OS primitive reported a failure.
    #[error("{context}: {source}")]
    Os {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wraps the calling thread's current `errno`.
    #[cfg(unix)]
    pub(crate) fn last_os_error(context: &'static str) -> Self {
        Error::Os {
            context,
            source: io::Error::last_os_error(),
        }
    }
}

/// Shorthand for results carrying this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
