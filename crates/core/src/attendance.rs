//! Check-in window arithmetic and the attendance status vocabulary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;

pub const DEFAULT_CHECKIN_WINDOW_MINS: i64 = 15;
pub const DEFAULT_GRACE_MINS: i64 = 10;
/// Upper bound for both the check-in window and the grace period (one week).
pub const MAX_WINDOW_MINS: i64 = 7 * 24 * 60;

// ─── Statuses ───────────────────────────────────────────────────────────────

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RuleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(RuleError::UnknownStatus {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Published,
    Ongoing,
    Postponed,
    Completed,
    Cancelled,
    Archived,
}

string_enum!(EventStatus, "event", {
    Draft => "draft",
    Published => "published",
    Ongoing => "ongoing",
    Postponed => "postponed",
    Completed => "completed",
    Cancelled => "cancelled",
    Archived => "archived",
});

impl EventStatus {
    /// Statuses in which participants may still check in.
    pub fn is_checkin_actionable(&self) -> bool {
        matches!(self, Self::Published | Self::Ongoing)
    }

    /// Statuses the completion pass never touches again.
    pub const TERMINAL: [Self; 3] = [Self::Completed, Self::Cancelled, Self::Archived];

    /// Statuses an ended event may still be completed from.
    pub const COMPLETABLE: [Self; 4] = [Self::Draft, Self::Published, Self::Ongoing, Self::Postponed];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

/// Registration state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    Registered,
    Waitlisted,
    Cancelled,
    Attended,
    NoShow,
}

string_enum!(ParticipationStatus, "participation", {
    Registered => "registered",
    Waitlisted => "waitlisted",
    Cancelled => "cancelled",
    Attended => "attended",
    NoShow => "no_show",
});

/// Attendance outcome recorded for a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    Unknown,
    Present,
    Late,
    Absent,
}

string_enum!(AttendanceStatus, "attendance", {
    Unknown => "unknown",
    Present => "present",
    Late => "late",
    Absent => "absent",
});

impl AttendanceStatus {
    /// Present or late.
    pub fn is_attended(&self) -> bool {
        matches!(self, Self::Present | Self::Late)
    }
}

// ─── Window ─────────────────────────────────────────────────────────────────

/// Result of evaluating a check-in attempt against an event's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    TooEarly,
    Present,
    Late,
}

impl WindowOutcome {
    /// The attendance status this outcome records, if check-in is allowed.
    pub fn attendance_status(&self) -> Option<AttendanceStatus> {
        match self {
            Self::TooEarly => None,
            Self::Present => Some(AttendanceStatus::Present),
            Self::Late => Some(AttendanceStatus::Late),
        }
    }
}

/// Timing configuration for one event's check-in window.
///
/// Check-in opens `checkin_window_mins` before `start`. Check-ins up to
/// `grace_mins` after `start` count as present, later ones as late. There is
/// no closing time: the event's lifecycle status decides when check-in ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTiming {
    pub start: DateTime<Utc>,
    pub checkin_window_mins: i64,
    pub grace_mins: i64,
}

impl EventTiming {
    pub fn new(start: DateTime<Utc>, checkin_window_mins: i64, grace_mins: i64) -> Self {
        Self {
            start,
            checkin_window_mins,
            grace_mins,
        }
    }

    /// Build timing from optional per-event overrides, falling back to defaults.
    pub fn with_defaults(
        start: DateTime<Utc>,
        checkin_window_mins: Option<i64>,
        grace_mins: Option<i64>,
        default_window_mins: i64,
        default_grace_mins: i64,
    ) -> Self {
        Self::new(
            start,
            checkin_window_mins.unwrap_or(default_window_mins),
            grace_mins.unwrap_or(default_grace_mins),
        )
    }

    pub fn window_start(&self) -> Result<DateTime<Utc>, RuleError> {
        Duration::try_minutes(self.checkin_window_mins)
            .and_then(|d| self.start.checked_sub_signed(d))
            .ok_or(RuleError::WindowOutOfRange {
                field: "checkin_window_mins",
                minutes: self.checkin_window_mins,
            })
    }

    pub fn grace_deadline(&self) -> Result<DateTime<Utc>, RuleError> {
        Duration::try_minutes(self.grace_mins)
            .and_then(|d| self.start.checked_add_signed(d))
            .ok_or(RuleError::WindowOutOfRange {
                field: "grace_mins",
                minutes: self.grace_mins,
            })
    }

    /// Classify a check-in at `now`. Both boundaries are inclusive.
    pub fn classify(&self, now: DateTime<Utc>) -> Result<WindowOutcome, RuleError> {
        Ok(if now < self.window_start()? {
            WindowOutcome::TooEarly
        } else if now <= self.grace_deadline()? {
            WindowOutcome::Present
        } else {
            WindowOutcome::Late
        })
    }
}

/// Reject window or grace minutes outside `0..=MAX_WINDOW_MINS`.
pub fn validate_window_mins(field: &'static str, minutes: i64) -> Result<(), RuleError> {
    if (0..=MAX_WINDOW_MINS).contains(&minutes) {
        Ok(())
    } else {
        Err(RuleError::WindowOutOfRange { field, minutes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
    }

    fn timing() -> EventTiming {
        EventTiming::new(start(), 15, 10)
    }

    #[test]
    fn derives_window_start_and_grace_deadline() {
        let t = timing();
        assert_eq!(t.window_start().unwrap(), start() - Duration::minutes(15));
        assert_eq!(t.grace_deadline().unwrap(), start() + Duration::minutes(10));
    }

    #[test]
    fn window_start_is_inclusive() {
        let t = timing();
        assert_eq!(t.classify(t.window_start().unwrap()).unwrap(), WindowOutcome::Present);
        assert_eq!(
            t.classify(t.window_start().unwrap() - Duration::milliseconds(1)).unwrap(),
            WindowOutcome::TooEarly
        );
    }

    #[test]
    fn grace_deadline_is_inclusive() {
        let t = timing();
        assert_eq!(t.classify(t.grace_deadline().unwrap()).unwrap(), WindowOutcome::Present);
        assert_eq!(
            t.classify(t.grace_deadline().unwrap() + Duration::milliseconds(1)).unwrap(),
            WindowOutcome::Late
        );
    }

    #[test]
    fn minute_level_scenario() {
        let t = timing();
        let at = |mins: i64| t.classify(start() + Duration::minutes(mins)).unwrap();
        assert_eq!(at(-16), WindowOutcome::TooEarly);
        assert_eq!(at(-15), WindowOutcome::Present);
        assert_eq!(at(10), WindowOutcome::Present);
        assert_eq!(at(11), WindowOutcome::Late);
    }

    #[test]
    fn no_upper_bound_on_late_check_in() {
        let t = timing();
        assert_eq!(
            t.classify(start() + Duration::days(30)).unwrap(),
            WindowOutcome::Late
        );
    }

    #[test]
    fn zero_window_opens_exactly_at_start() {
        let t = EventTiming::new(start(), 0, 0);
        assert_eq!(
            t.classify(start() - Duration::seconds(1)).unwrap(),
            WindowOutcome::TooEarly
        );
        assert_eq!(t.classify(start()).unwrap(), WindowOutcome::Present);
        assert_eq!(t.classify(start() + Duration::seconds(1)).unwrap(), WindowOutcome::Late);
    }

    #[test]
    fn oversized_minutes_are_errors_not_panics() {
        let t = EventTiming::new(start(), i64::MAX, 10);
        assert_eq!(
            t.classify(start()).unwrap_err(),
            RuleError::WindowOutOfRange {
                field: "checkin_window_mins",
                minutes: i64::MAX
            }
        );
        let t = EventTiming::new(start(), 15, i64::MAX);
        assert!(t.grace_deadline().is_err());
    }

    #[test]
    fn window_minutes_are_bounded_to_a_week() {
        assert!(validate_window_mins("grace_mins", 0).is_ok());
        assert!(validate_window_mins("grace_mins", MAX_WINDOW_MINS).is_ok());
        assert!(validate_window_mins("grace_mins", MAX_WINDOW_MINS + 1).is_err());
        assert!(validate_window_mins("grace_mins", -1).is_err());
    }

    #[test]
    fn with_defaults_uses_fallbacks_only_when_missing() {
        let t = EventTiming::with_defaults(start(), None, Some(5), 15, 10);
        assert_eq!(t.checkin_window_mins, 15);
        assert_eq!(t.grace_mins, 5);
    }

    #[test]
    fn actionable_statuses() {
        assert!(EventStatus::Published.is_checkin_actionable());
        assert!(EventStatus::Ongoing.is_checkin_actionable());
        for status in [
            EventStatus::Draft,
            EventStatus::Postponed,
            EventStatus::Completed,
            EventStatus::Cancelled,
            EventStatus::Archived,
        ] {
            assert!(!status.is_checkin_actionable(), "{status}");
        }
    }

    #[test]
    fn completable_and_terminal_partition_statuses() {
        for status in EventStatus::COMPLETABLE {
            assert!(!status.is_terminal(), "{status}");
        }
        assert_eq!(
            EventStatus::COMPLETABLE.len() + EventStatus::TERMINAL.len(),
            7
        );
        assert!(EventStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_strings_round_trip_and_reject_unknown() {
        assert_eq!(
            "no_show".parse::<ParticipationStatus>().unwrap(),
            ParticipationStatus::NoShow
        );
        assert_eq!(AttendanceStatus::Late.as_str(), "late");
        let err = "excused".parse::<AttendanceStatus>().unwrap_err();
        assert_eq!(
            err,
            RuleError::UnknownStatus {
                kind: "attendance",
                value: "excused".to_string()
            }
        );
    }
}
