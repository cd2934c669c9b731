//! Time source for the blocking poll loops.
//!
//! Every wait in this crate is a sleep-and-poll loop against a deadline, so
//! the only thing it needs from the outside world is "what time is it" and
//! "sleep for a while". Tests substitute a virtual clock.

use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;

pub trait Clock: DelayNs {
    fn now(&mut self) -> Instant;

    fn sleep(&mut self, duration: Duration) {
        let us = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
        self.delay_us(us);
    }

    /// Time elapsed since `start`, zero if `start` lies in the future.
    fn elapsed(&mut self, start: Instant) -> Duration {
        self.now().saturating_duration_since(start)
    }
}

/// Wall clock backed by the `embassy-time` std driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl DelayNs for SystemClock {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(core::time::Duration::from_nanos(u64::from(ns)));
    }
}

impl Clock for SystemClock {
    fn now(&mut self) -> Instant {
        Instant::now()
    }
}
