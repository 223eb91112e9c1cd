use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

/// Source of the current instant, injected so time-dependent rules are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    time: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time: RwLock::new(time) }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        match self.time.write() {
            Ok(mut guard) => *guard = time,
            Err(poisoned) => *poisoned.into_inner() = time,
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.time.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let clock = FixedClock::new(start);

        clock.advance(Duration::minutes(90));

        assert_eq!(clock.now(), start + Duration::minutes(90));
    }
}
