use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Rolling-window streak counters for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current: i64,
    pub longest: i64,
    pub last_event: Option<DateTime<Utc>>,
}

impl StreakState {
    /// Record a streak-eligible action at `now`.
    ///
    /// The streak continues when the previous action is at most
    /// `window_hours` old and restarts at 1 otherwise.
    pub fn bump(self, now: DateTime<Utc>, window_hours: i64) -> Self {
        let within_window = self
            .last_event
            .is_some_and(|last| now - last <= Duration::hours(window_hours));
        let current = if within_window { self.current + 1 } else { 1 };
        Self {
            current,
            longest: self.longest.max(current),
            last_event: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn first_action_starts_streak() {
        let s = StreakState::default().bump(t0(), 48);
        assert_eq!(s.current, 1);
        assert_eq!(s.longest, 1);
        assert_eq!(s.last_event, Some(t0()));
    }

    #[test]
    fn action_inside_window_extends() {
        let s = StreakState::default()
            .bump(t0(), 48)
            .bump(t0() + Duration::hours(48), 48);
        assert_eq!(s.current, 2);
        assert_eq!(s.longest, 2);
    }

    #[test]
    fn gap_beyond_window_resets_but_keeps_longest() {
        let s = StreakState::default()
            .bump(t0(), 48)
            .bump(t0() + Duration::hours(24), 48)
            .bump(t0() + Duration::hours(60), 48)
            .bump(t0() + Duration::hours(109), 48);
        assert_eq!(s.current, 1);
        assert_eq!(s.longest, 3);
    }
}
