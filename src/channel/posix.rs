use super::WakeChannel;
use crate::{Error, Result};
use std::cell::UnsafeCell;
use std::io;
use std::mem;
use std::time::Instant;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A [`WakeChannel`] backed by an unnamed, process-private POSIX semaphore (`sem_init` with
/// `pshared = 0`).
///
/// The `sem_t` is boxed because POSIX forbids moving an initialized semaphore.
pub struct PosixSemaphore {
    sem: Box<UnsafeCell<libc::sem_t>>,
}

// sem_wait/sem_post are thread-safe by definition; the cell only exists to hand out *mut.
unsafe impl Send for PosixSemaphore {}
unsafe impl Sync for PosixSemaphore {}

impl PosixSemaphore {
    fn as_ptr(&self) -> *mut libc::sem_t {
        self.sem.get()
    }

    fn wait_forever(&self) -> Result<bool> {
        loop {
            if unsafe { libc::sem_wait(self.as_ptr()) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(Error::Os {
                    context: "cannot acquire semaphore",
                    source: err,
                });
            }
        }
    }

    fn wait_until(&self, deadline: Instant) -> Result<bool> {
        loop {
            let abstime = realtime_deadline(deadline)?;
            if unsafe { libc::sem_timedwait(self.as_ptr(), &abstime) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                // Recompute the absolute deadline from the monotonic one and go again.
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => {
                    // CLOCK_REALTIME may have been stepped backwards under us.
                    if Instant::now() < deadline {
                        continue;
                    }
                    return Ok(false);
                }
                _ => {
                    return Err(Error::Os {
                        context: "cannot acquire semaphore",
                        source: err,
                    })
                }
            }
        }
    }
}

impl WakeChannel for PosixSemaphore {
    fn new() -> Result<Self> {
        let sem = Box::new(UnsafeCell::new(unsafe { mem::zeroed::<libc::sem_t>() }));
        if unsafe { libc::sem_init(sem.get(), 0, 0) } != 0 {
            return Err(Error::last_os_error("cannot init semaphore"));
        }
        Ok(PosixSemaphore { sem })
    }

    fn wait(&self, deadline: Option<Instant>) -> Result<bool> {
        match deadline {
            None => self.wait_forever(),
            Some(deadline) => self.wait_until(deadline),
        }
    }

    fn post(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.as_ptr()) } != 0 {
            return Err(Error::last_os_error("cannot release semaphore"));
        }
        Ok(())
    }
}

impl Drop for PosixSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_destroy(self.as_ptr());
        }
    }
}

/// Converts a monotonic deadline into the absolute `CLOCK_REALTIME` timestamp that
/// `sem_timedwait` expects, saturating instead of overflowing `time_t`.
fn realtime_deadline(deadline: Instant) -> Result<libc::timespec> {
    let remaining = deadline.saturating_duration_since(Instant::now());

    let mut now: libc::timespec = unsafe { mem::zeroed() };
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
        return Err(Error::last_os_error("cannot read realtime clock"));
    }

    let mut nanos = now.tv_nsec as i64 + i64::from(remaining.subsec_nanos());
    let mut carry: libc::time_t = 0;
    if nanos >= NANOS_PER_SEC {
        nanos -= NANOS_PER_SEC;
        carry = 1;
    }

    let secs = libc::time_t::try_from(remaining.as_secs())
        .ok()
        .and_then(|secs| now.tv_sec.checked_add(secs))
        .and_then(|secs| secs.checked_add(carry))
        .unwrap_or(libc::time_t::MAX);

    let mut abstime: libc::timespec = unsafe { mem::zeroed() };
    abstime.tv_sec = secs;
    abstime.tv_nsec = nanos as _;
    Ok(abstime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn realtime_deadline_normalizes_nanos() {
        let abstime = realtime_deadline(Instant::now() + Duration::from_millis(1500)).unwrap();
        assert!((abstime.tv_nsec as i64) < NANOS_PER_SEC);
        assert!(abstime.tv_nsec >= 0);
    }

    #[test]
    fn realtime_deadline_in_the_past_is_now() {
        let past = Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        let mut now: libc::timespec = unsafe { mem::zeroed() };
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };
        let abstime = realtime_deadline(past).unwrap();
        assert!(abstime.tv_sec - now.tv_sec <= 1);
    }

    #[test]
    fn post_then_wait() {
        let sem = PosixSemaphore::new().unwrap();
        sem.post().unwrap();
        assert_eq!(true, sem.wait(None).unwrap());
        assert_eq!(
            false,
            sem.wait(Some(Instant::now() + Duration::from_millis(10))).unwrap()
        );
    }
}
