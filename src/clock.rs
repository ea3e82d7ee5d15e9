use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of timestamps for `created_at` and `completed_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Each call to `now` also steps it
/// forward by `step`, so consecutive timestamps stay distinct.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_step(start, Duration::zero())
    }

    pub fn with_step(start: DateTime<Utc>, step: Duration) -> Self {
        ManualClock {
            current: Mutex::new(start),
            step,
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = to;
    }

    /// Current time without stepping.
    pub fn peek(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        let now = *current;
        *current += self.step;
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_steps() {
        let start = Utc.timestamp_opt(1_000, 0).unwrap();
        let clock = ManualClock::with_step(start, Duration::seconds(1));
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start + Duration::seconds(1));

        clock.advance(Duration::minutes(1));
        assert_eq!(clock.peek(), start + Duration::seconds(62));
    }

    #[test]
    fn manual_clock_holds_still_without_step() {
        let start = Utc.timestamp_opt(5, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), clock.now());
        clock.set(start + Duration::hours(1));
        assert_eq!(clock.now(), start + Duration::hours(1));
    }
}
