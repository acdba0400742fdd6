//! Shared test harness: a simulated tick host.
//!
//! Drives a [`Scheduler`] the way a frame loop would: virtual time
//! advances by a fixed amount per tick and the scheduler is pumped once
//! with the new time.

#![allow(dead_code)]

use cotick::{Scheduler, Time};
use std::time::Duration;

pub struct TickHost {
    pub scheduler: Scheduler,
    now: Time,
    tick: Duration,
}

impl TickHost {
    /// A host ticking at ~60Hz.
    pub fn new() -> Self {
        Self::with_tick(Duration::from_millis(16))
    }

    pub fn with_tick(tick: Duration) -> Self {
        Self {
            scheduler: Scheduler::new(),
            now: Time::ZERO,
            tick,
        }
    }

    pub fn now(&self) -> Time {
        self.now
    }

    /// Advances one tick and pumps the scheduler.
    pub fn tick(&mut self) {
        self.now = self.now + self.tick;
        self.scheduler.pump(self.now);
    }

    pub fn tick_many(&mut self, count: usize) {
        for _ in 0..count {
            self.tick();
        }
    }

    /// Ticks until `done` returns true, up to `budget` ticks. Returns
    /// whether `done` was observed.
    pub fn tick_until(&mut self, mut done: impl FnMut() -> bool, budget: usize) -> bool {
        for _ in 0..budget {
            if done() {
                return true;
            }
            self.tick();
        }
        done()
    }
}

/// Routes crate tracing to the test writer; safe to call repeatedly.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
