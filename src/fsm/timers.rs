//! Anti-cycling and overrun timers.
//!
//! Timers are wall-clock spans re-checked every cycle; nothing fires on
//! its own.  A timer is started and cancelled only by state entry and
//! exit actions.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::BoilerConfig;

#[derive(Debug, Clone, Copy)]
pub struct Timer {
    duration: Duration,
    started: Option<Instant>,
}

impl Timer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn cancel(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Started and the full duration has passed.
    pub fn is_elapsed(&self, now: Instant) -> bool {
        self.started
            .is_some_and(|t| now.saturating_duration_since(t) >= self.duration)
    }

    /// Started and still counting down.
    pub fn is_active(&self, now: Instant) -> bool {
        self.is_running() && !self.is_elapsed(now)
    }

    /// Time left, `None` if the timer is not running.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.started
            .map(|t| self.duration.saturating_sub(now.saturating_duration_since(t)))
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// The four boiler timers.
#[derive(Debug, Clone, Copy)]
pub struct BoilerTimers {
    pub min_on: Timer,
    pub min_off: Timer,
    pub off_delay: Timer,
    pub pump_overrun: Timer,
}

impl BoilerTimers {
    pub fn new(config: &BoilerConfig) -> Self {
        Self {
            min_on: Timer::new(config.min_on()),
            min_off: Timer::new(config.min_off()),
            off_delay: Timer::new(config.off_delay()),
            pump_overrun: Timer::new(config.pump_overrun()),
        }
    }

    pub fn remaining(&self, now: Instant) -> TimerRemaining {
        let secs = |t: &Timer| t.remaining(now).map(|d| d.as_secs());
        TimerRemaining {
            min_on_secs: secs(&self.min_on),
            min_off_secs: secs(&self.min_off),
            off_delay_secs: secs(&self.off_delay),
            pump_overrun_secs: secs(&self.pump_overrun),
        }
    }
}

/// Whole seconds left on each timer, for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimerRemaining {
    pub min_on_secs: Option<u64>,
    pub min_off_secs: Option<u64>,
    pub off_delay_secs: Option<u64>,
    pub pump_overrun_secs: Option<u64>,
}
