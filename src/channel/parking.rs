use super::WakeChannel;
use crate::Result;
use parking_lot_core as plc;
use parking_lot_core::ParkResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// A portable [`WakeChannel`] that suspends threads through `parking_lot_core` instead of an
/// OS semaphore. Used on platforms without unnamed POSIX semaphores, or wherever it is named
/// explicitly as the channel type.
pub struct ParkingChannel {
    permits: AtomicUsize,
}

impl ParkingChannel {
    fn key(&self) -> usize {
        self as *const ParkingChannel as usize
    }

    /// Attempts to consume one pending wakeup. Returns true upon success.
    fn try_take(&self) -> bool {
        let mut permits = self.permits.load(Ordering::Acquire);
        while permits > 0 {
            match self.permits.compare_exchange_weak(
                permits,
                permits - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => permits = current,
            }
        }
        false
    }
}

impl WakeChannel for ParkingChannel {
    fn new() -> Result<Self> {
        Ok(ParkingChannel {
            permits: AtomicUsize::new(0),
        })
    }

    fn wait(&self, deadline: Option<Instant>) -> Result<bool> {
        loop {
            if self.try_take() {
                return Ok(true);
            }

            // The validation callback runs with the parking queue locked, so a post() that
            // lands between try_take() and here either makes us skip parking or unparks us.
            let park_result = unsafe {
                plc::park(
                    self.key(),
                    || self.permits.load(Ordering::Acquire) == 0,
                    || {},
                    |_, _| {},
                    plc::DEFAULT_PARK_TOKEN,
                    deadline,
                )
            };

            if park_result == ParkResult::TimedOut {
                return Ok(self.try_take());
            }
        }
    }

    fn post(&self) -> Result<()> {
        self.permits.fetch_add(1, Ordering::Release);
        unsafe {
            plc::unpark_one(self.key(), |_| plc::DEFAULT_UNPARK_TOKEN);
        }
        Ok(())
    }
}
