use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

use crate::clock::Clock;
use crate::level::{LevelTable, LevelThreshold};

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// A fixed reference instant (2026-03-14 18:00 UTC) for event starts.
pub fn event_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
}

/// `event_start()` shifted by `mins` minutes.
pub fn minutes_from_start(mins: i64) -> DateTime<Utc> {
    event_start() + Duration::minutes(mins)
}

/// Four-level table: 0 / 100 / 200 / 300.
pub fn small_level_table() -> LevelTable {
    LevelTable::new(vec![
        LevelThreshold::new(1, 0),
        LevelThreshold::new(2, 100),
        LevelThreshold::new(3, 200),
        LevelThreshold::new(4, 300),
    ])
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_moves_only_on_request() {
        let clock = FixedClock::new(event_start());
        assert_eq!(clock.now(), event_start());
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), minutes_from_start(5));
        clock.set(minutes_from_start(-20));
        assert_eq!(clock.now(), minutes_from_start(-20));
    }
}
