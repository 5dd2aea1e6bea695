use std::ops::{Add, AddAssign};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

pub trait Clock {
    fn utc(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub utc: DateTime<Utc>,
    pub monotonic: Instant,
}

impl Timestamp {
    pub fn now(clock: &dyn Clock) -> Timestamp {
        Timestamp {
            utc: clock.utc(),
            monotonic: clock.monotonic(),
        }
    }

    /// ISO-8601 representation of the UTC time, millisecond resolution
    pub fn to_rfc3339(&self) -> String {
        self.utc.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Time elapsed since the start of a simulation run
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct Instant {
    delta: TimeDelta,
}

impl Instant {
    pub fn from_delta(delta: TimeDelta) -> Self {
        Instant { delta }
    }

    pub fn elapsed(&self) -> TimeDelta {
        self.delta
    }

    pub fn elapsed_seconds_f64(&self) -> f64 {
        seconds_f64(self.delta)
    }
}

impl Add<TimeDelta> for Instant {
    type Output = Instant;

    fn add(self, rhs: TimeDelta) -> Self::Output {
        Instant {
            delta: self.delta + rhs,
        }
    }
}

impl AddAssign<TimeDelta> for Instant {
    fn add_assign(&mut self, rhs: TimeDelta) {
        self.delta += rhs;
    }
}

/// Wall clock. The monotonic time counts from the creation of the clock.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant {
            delta: TimeDelta::from_std(self.start.elapsed()).unwrap_or(TimeDelta::MAX),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedClock {
    utc_epoch: DateTime<Utc>,
    elapsed: TimeDelta,
}

impl SimulatedClock {
    pub fn new(utc_epoch: DateTime<Utc>, elapsed: TimeDelta) -> SimulatedClock {
        SimulatedClock { utc_epoch, elapsed }
    }

    pub fn step(&mut self, delta: TimeDelta) {
        self.elapsed += delta
    }
}

impl Clock for SimulatedClock {
    fn utc(&self) -> DateTime<Utc> {
        self.utc_epoch + self.elapsed
    }

    fn monotonic(&self) -> Instant {
        Instant {
            delta: self.elapsed,
        }
    }
}

pub fn seconds_f64(td: TimeDelta) -> f64 {
    td.num_seconds() as f64 + (td.subsec_nanos() as f64) / 1_000_000_000.0
}

/// Converts a period in seconds to a `TimeDelta` with microsecond resolution
pub fn delta_from_secs_f64(secs: f64) -> TimeDelta {
    TimeDelta::microseconds((secs * 1_000_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_clock_steps() {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let mut clock = SimulatedClock::new(epoch, TimeDelta::zero());

        clock.step(TimeDelta::milliseconds(100));
        clock.step(TimeDelta::milliseconds(100));

        assert_eq!(clock.monotonic().elapsed(), TimeDelta::milliseconds(200));
        assert_eq!(clock.utc(), epoch + TimeDelta::milliseconds(200));
        assert_eq!(clock.monotonic().elapsed_seconds_f64(), 0.2);
    }

    #[test]
    fn test_delta_conversion() {
        assert_eq!(delta_from_secs_f64(0.01), TimeDelta::milliseconds(10));
        assert_eq!(delta_from_secs_f64(1.0), TimeDelta::seconds(1));
        assert_eq!(seconds_f64(TimeDelta::milliseconds(1500)), 1.5);
    }

    #[test]
    fn test_timestamp_format() {
        let clock = SimulatedClock::new(DateTime::<Utc>::UNIX_EPOCH, TimeDelta::seconds(61));
        let ts = Timestamp::now(&clock);

        assert_eq!(ts.to_rfc3339(), "1970-01-01T00:01:01.000Z");
    }
}
