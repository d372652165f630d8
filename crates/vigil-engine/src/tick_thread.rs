//! Tick loop for the background tick thread.
//!
//! The tick thread owns the [`TickDriver`] exclusively (moved in via
//! `thread::Builder::spawn`). Between ticks it sleeps on the
//! [`TickClock`]; progress is mirrored into [`Progress`] so other threads
//! can observe it without touching the driver.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use vigil_core::TickId;

use crate::clock::TickClock;
use crate::driver::TickDriver;
use crate::metrics::TickMetrics;
use crate::sync::lock;

/// Tick progress shared with the owning `Simulation`.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    tick: AtomicU64,
    metrics: Mutex<TickMetrics>,
}

impl Progress {
    pub fn record(&self, tick: TickId, metrics: &TickMetrics) {
        *lock(&self.metrics) = metrics.clone();
        self.tick.store(tick.0, Ordering::Release);
    }

    pub fn tick(&self) -> TickId {
        TickId(self.tick.load(Ordering::Acquire))
    }

    pub fn metrics(&self) -> TickMetrics {
        lock(&self.metrics).clone()
    }
}

/// State held by the tick thread's main loop.
pub(crate) struct TickThreadState {
    driver: TickDriver,
    clock: TickClock,
    progress: Arc<Progress>,
    shutdown_flag: Arc<AtomicBool>,
    tick_stopped: Arc<AtomicBool>,
}

impl TickThreadState {
    pub fn new(
        driver: TickDriver,
        clock: TickClock,
        progress: Arc<Progress>,
        shutdown_flag: Arc<AtomicBool>,
        tick_stopped: Arc<AtomicBool>,
    ) -> Self {
        Self {
            driver,
            clock,
            progress,
            shutdown_flag,
            tick_stopped,
        }
    }

    /// Main tick loop. Runs until `shutdown_flag` is set; the tick in
    /// flight when the flag is raised finishes first.
    ///
    /// Consumes self and returns the driver so the caller can inspect the
    /// final world.
    pub fn run(mut self) -> TickDriver {
        loop {
            // 1. Sleep to the next tick boundary.
            self.clock.wait_for_next(&self.shutdown_flag);
            if self.shutdown_flag.load(Ordering::Acquire) {
                break;
            }

            // 2. Execute the tick.
            let report = self.driver.step();
            self.progress.record(report.tick, &report.metrics);
        }

        self.tick_stopped.store(true, Ordering::Release);
        self.driver
    }
}
