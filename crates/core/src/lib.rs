pub mod achievement;
pub mod attendance;
pub mod clock;
pub mod error;
pub mod event;
pub mod level;
pub mod rules;
pub mod stats;
pub mod streak;

pub use achievement::{AchievementCode, BadgeLevel, ThresholdKind, TierPoints, TierThresholds};
pub use attendance::{
    AttendanceStatus, EventStatus, EventTiming, MAX_WINDOW_MINS, ParticipationStatus,
    WindowOutcome, validate_window_mins,
};
pub use clock::{Clock, SystemClock};
pub use error::RuleError;
pub use event::DomainEvent;
pub use level::{LevelProgress, LevelTable, LevelThreshold};
pub use rules::{ActionConfig, GamificationAction, StatsDelta};
pub use stats::UserGamificationStats;
pub use streak::StreakState;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
