//! Domain events emitted after a primary operation commits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::achievement::BadgeLevel;
use crate::attendance::AttendanceStatus;
use crate::rules::GamificationAction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ParticipantCheckedIn {
        event_id: i64,
        participant_id: i64,
        user_id: Option<i64>,
        status: AttendanceStatus,
        marked_by: Option<i64>,
        at: DateTime<Utc>,
    },
    AttendanceCorrected {
        event_id: i64,
        participant_id: i64,
        user_id: Option<i64>,
        previous: AttendanceStatus,
        status: AttendanceStatus,
        marked_by: Option<i64>,
        reason: Option<String>,
    },
    /// A participant was finalized as having attended the event.
    ParticipantAttended {
        event_id: i64,
        participant_id: i64,
        user_id: i64,
    },
    AbsencesFlagged {
        event_id: i64,
        flagged: u64,
    },
    EventCompleted {
        event_id: i64,
        job_id: String,
    },
    PointsAwarded {
        user_id: i64,
        action: GamificationAction,
        event_id: Option<i64>,
        points_delta: i64,
    },
    BadgeUnlocked {
        user_id: i64,
        badge_code: String,
        name: String,
        level: Option<BadgeLevel>,
    },
    LevelUp {
        user_id: i64,
        from: i64,
        to: i64,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ParticipantCheckedIn { .. } => "participant_checked_in",
            Self::AttendanceCorrected { .. } => "attendance_corrected",
            Self::ParticipantAttended { .. } => "participant_attended",
            Self::AbsencesFlagged { .. } => "absences_flagged",
            Self::EventCompleted { .. } => "event_completed",
            Self::PointsAwarded { .. } => "points_awarded",
            Self::BadgeUnlocked { .. } => "badge_unlocked",
            Self::LevelUp { .. } => "level_up",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = DomainEvent::LevelUp {
            user_id: 3,
            from: 1,
            to: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "level_up");
        assert_eq!(json["to"], 2);
        assert_eq!(event.name(), "level_up");
    }
}
