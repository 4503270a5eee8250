//! Timer branches, built on `futures-timer::Delay` so the crate stays
//! executor-agnostic, matching the channel kernels themselves.

use std::time::{Duration, Instant};

use futures_timer::Delay;

/// A one-shot deadline; fires once and is then spent.
pub struct OnceTimer {
    delay: Delay,
}

impl OnceTimer {
    pub fn new(d: Duration) -> Self {
        OnceTimer { delay: Delay::new(d) }
    }

    pub(crate) fn delay_mut(&mut self) -> &mut Delay {
        &mut self.delay
    }
}

/// A reusable periodic tick, owned by the caller and re-armed across
/// repeated `select` calls.
///
/// Drift-compensated: the next deadline is the smallest `start +
/// k*period` strictly greater than `now`, so a scheduler stall does not
/// cause the tick to permanently lag by the stall amount.
pub struct PeriodicTimer {
    period: Duration,
    start: Instant,
    ticks_fired: u64,
    delay: Delay,
}

impl PeriodicTimer {
    pub fn new(period: Duration) -> Self {
        Self::starting_at(period, Instant::now())
    }

    pub fn starting_at(period: Duration, start_at: Instant) -> Self {
        let now = Instant::now();
        let first_deadline = Self::next_deadline_after(start_at, period, now, 0);
        let delay = Delay::new(first_deadline.saturating_duration_since(now));
        PeriodicTimer { period, start: start_at, ticks_fired: 0, delay }
    }

    fn next_deadline_after(start: Instant, period: Duration, now: Instant, fired: u64) -> Instant {
        let period_nanos = period.as_nanos().max(1);
        let elapsed = now.saturating_duration_since(start).as_nanos();
        let k = (elapsed / period_nanos) + 1;
        let k = k.max(fired as u128 + 1);
        start + Duration::from_nanos((k * period_nanos) as u64)
    }

    pub(crate) fn delay_mut(&mut self) -> &mut Delay {
        &mut self.delay
    }

    /// Called once the current deadline has fired; re-arms drift-compensated.
    pub(crate) fn rearm(&mut self) {
        self.ticks_fired += 1;
        let now = Instant::now();
        let next = Self::next_deadline_after(self.start, self.period, now, self.ticks_fired);
        self.delay = Delay::new(next.saturating_duration_since(now));
    }
}
