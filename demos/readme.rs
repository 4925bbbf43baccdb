//! This example uses an [`InterruptibleEvent`] as a start gate and a second one as a shutdown
//! flag for a small pool of worker threads. Idle workers sleep on their own semaphore (no
//! polling) and wake up either when the event is set or when their timeout expires.
//!
//! [`InterruptibleEvent`]: semevent::InterruptibleEvent

use semevent::{Event, EventState, InterruptibleEvent};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn main() -> semevent::Result<()> {
    let start = Arc::new(InterruptibleEvent::new(EventState::Unset));
    let shutdown = Arc::new(InterruptibleEvent::default());
    let ticks = Arc::new(AtomicU32::new(0));

    const THREAD_COUNT: usize = 3;
    let mut threads = Vec::with_capacity(THREAD_COUNT);
    for thread_idx in 0..THREAD_COUNT {
        let start = Arc::clone(&start);
        let shutdown = Arc::clone(&shutdown);
        let ticks = Arc::clone(&ticks);
        threads.push(std::thread::spawn(move || -> semevent::Result<()> {
            // Every worker is released by the same set() call.
            start.wait_forever()?;
            eprintln!("Thread {thread_idx} started");

            // wait_for() doubles as an interruptible sleep: it returns `true` as soon as
            // shutdown is set, and `false` after each quiet 100ms.
            while !shutdown.wait_for(Duration::from_millis(100))? {
                ticks.fetch_add(1, Ordering::Relaxed);
            }
            eprintln!("Thread {thread_idx} shutting down");
            Ok(())
        }));
    }

    std::thread::sleep(Duration::from_millis(50));
    start.set()?;

    std::thread::sleep(Duration::from_millis(350));
    shutdown.set()?;

    for jh in threads {
        jh.join().expect("Worker thread panicked!")?;
    }
    eprintln!(
        "All workers exited after {} ticks",
        ticks.load(Ordering::Relaxed)
    );
    Ok(())
}
