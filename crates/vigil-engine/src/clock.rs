//! Fixed-interval tick pacing.
//!
//! [`TickClock`] approximates a fixed interval between tick *starts*. If a
//! tick overran its budget the next one starts immediately; missed ticks
//! are never made up. Sleeping uses `thread::park_timeout`, so
//! `Thread::unpark` wakes a pacing tick thread at once on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Paces the tick loop.
#[derive(Debug, Clone)]
pub struct TickClock {
    interval: Duration,
    last_start: Option<Instant>,
}

impl TickClock {
    /// A clock targeting one tick start every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_start: None,
        }
    }

    /// Time left until the next tick may start, measured at `now`.
    /// `Duration::ZERO` if the previous tick overran or none has started.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_start {
            Some(start) => (start + self.interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Block until the next tick boundary (or until `stop` is set) and mark
    /// the start of a new tick. Returns the tick start instant.
    pub fn wait_for_next(&mut self, stop: &AtomicBool) -> Instant {
        loop {
            if stop.load(Ordering::Acquire) {
                break;
            }
            let remaining = self.remaining(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::park_timeout(remaining);
        }
        let now = Instant::now();
        self.last_start = Some(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_tick_starts_immediately() {
        let mut clock = TickClock::new(Duration::from_secs(60));
        let before = Instant::now();
        clock.wait_for_next(&AtomicBool::new(false));
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn paces_consecutive_ticks() {
        let interval = Duration::from_millis(20);
        let mut clock = TickClock::new(interval);
        let stop = AtomicBool::new(false);
        let first = clock.wait_for_next(&stop);
        let second = clock.wait_for_next(&stop);
        assert!(second.duration_since(first) >= interval);
    }

    #[test]
    fn overrun_starts_next_tick_immediately() {
        let mut clock = TickClock::new(Duration::from_millis(5));
        let stop = AtomicBool::new(false);
        clock.wait_for_next(&stop);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.remaining(Instant::now()), Duration::ZERO);
        let before = Instant::now();
        clock.wait_for_next(&stop);
        assert!(before.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn stop_flag_and_unpark_cut_the_wait_short() {
        let stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut clock = TickClock::new(Duration::from_secs(60));
                clock.wait_for_next(&stop);
                let start = Instant::now();
                clock.wait_for_next(&stop);
                start.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        waiter.thread().unpark();
        let waited = waiter.join().unwrap();
        assert!(waited < Duration::from_secs(30));
    }
}
