//! Sample pacing
//!
//! Each tick gets `1 / rate` seconds. Whatever the ADC read did not use is
//! slept away; a read that overruns its budget is counted and logged but
//! never corrected, so a rate the hardware cannot sustain drifts slow
//! instead of stalling acquisition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source for the sampling loop
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Outcome of one tick's timing budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Read finished early; wait this long before the next one
    Sleep(Duration),
    /// Read took longer than the whole interval
    Missed { overrun: Duration },
}

/// Deadline-miss bookkeeping shared between the sampler and status readers
#[derive(Debug, Default)]
pub struct DeadlineStats {
    missed: AtomicU64,
    overrun_nanos: AtomicU64,
}

impl DeadlineStats {
    /// Record one miss and return the number of misses so far
    pub fn record(&self, overrun: Duration) -> u64 {
        let nanos = u64::try_from(overrun.as_nanos()).unwrap_or(u64::MAX);
        self.overrun_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.missed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    /// Total time lost to overruns, i.e. the accumulated lag behind wall clock
    pub fn overrun(&self) -> Duration {
        Duration::from_nanos(self.overrun_nanos.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.missed.store(0, Ordering::Relaxed);
        self.overrun_nanos.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SampleClock {
    interval: Duration,
}

impl SampleClock {
    pub fn new(rate: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / rate.max(1) as f64),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long to wait after a read that took `elapsed`
    pub fn budget(&self, elapsed: Duration) -> Pace {
        match self.interval.checked_sub(elapsed) {
            Some(remaining) => Pace::Sleep(remaining),
            None => Pace::Missed {
                overrun: elapsed - self.interval,
            },
        }
    }

    /// Apply the budget: sleep, or record a missed deadline
    pub fn pace(&self, clock: &dyn Clock, elapsed: Duration, stats: &DeadlineStats) -> Pace {
        let pace = self.budget(elapsed);
        match pace {
            Pace::Sleep(remaining) => {
                if !remaining.is_zero() {
                    clock.sleep(remaining);
                }
            }
            Pace::Missed { overrun } => {
                let missed = stats.record(overrun);
                if missed == 1 {
                    tracing::warn!(
                        interval_us = self.interval.as_micros() as u64,
                        elapsed_us = elapsed.as_micros() as u64,
                        "ADC read overran the sample interval; the device is too slow for this rate, choose a slower rate"
                    );
                } else {
                    tracing::debug!(
                        missed,
                        overrun_us = overrun.as_micros() as u64,
                        "Missed sample deadline"
                    );
                }
            }
        }
        pace
    }
}
