//! The closed catalog of reward-worthy actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;

pub const DEFAULT_STREAK_WINDOW_HOURS: i64 = 48;
pub const DEFAULT_DEDUPE_SUFFIX: &str = "default";

/// Per-action changes to the aggregate counters in `UserGamificationStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    pub events_registered: i64,
    pub events_attended: i64,
    pub events_hosted: i64,
}

/// Static configuration carried by every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionConfig {
    pub points: i64,
    pub stats: StatsDelta,
    pub streak_eligible: bool,
    /// Whether the action may reduce `total_points`.
    pub allow_negative: bool,
}

impl ActionConfig {
    const fn points(points: i64) -> Self {
        Self {
            points,
            stats: StatsDelta {
                events_registered: 0,
                events_attended: 0,
                events_hosted: 0,
            },
            streak_eligible: false,
            allow_negative: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamificationAction {
    EventRegister,
    WaitlistJoin,
    WaitlistPromotion,
    EventAttend,
    EventCancel,
    EventHostPublished,
    StreakDay,
    BadgeBonus,
}

impl GamificationAction {
    pub const ALL: [GamificationAction; 8] = [
        Self::EventRegister,
        Self::WaitlistJoin,
        Self::WaitlistPromotion,
        Self::EventAttend,
        Self::EventCancel,
        Self::EventHostPublished,
        Self::StreakDay,
        Self::BadgeBonus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventRegister => "EVENT_REGISTER",
            Self::WaitlistJoin => "WAITLIST_JOIN",
            Self::WaitlistPromotion => "WAITLIST_PROMOTION",
            Self::EventAttend => "EVENT_ATTEND",
            Self::EventCancel => "EVENT_CANCEL",
            Self::EventHostPublished => "EVENT_HOST_PUBLISHED",
            Self::StreakDay => "STREAK_DAY",
            Self::BadgeBonus => "BADGE_BONUS",
        }
    }

    pub fn config(&self) -> ActionConfig {
        let mut config = ActionConfig::points(0);
        match self {
            Self::EventRegister => {
                config.points = 10;
                config.stats.events_registered = 1;
            }
            Self::WaitlistJoin => config.points = 5,
            Self::WaitlistPromotion => {
                config.points = 8;
                config.stats.events_registered = 1;
            }
            Self::EventAttend => {
                config.points = 40;
                config.stats.events_attended = 1;
                config.streak_eligible = true;
            }
            Self::EventCancel => {
                config.points = -5;
                config.stats.events_registered = -1;
                config.allow_negative = true;
            }
            Self::EventHostPublished => {
                config.points = 25;
                config.stats.events_hosted = 1;
            }
            Self::StreakDay => config.points = 5,
            Self::BadgeBonus => {}
        }
        config
    }

    /// Settings key that may override the catalog point value,
    /// e.g. `gamification.event_attend_points`.
    pub fn points_setting_key(&self) -> String {
        format!("gamification.{}_points", self.as_str().to_ascii_lowercase())
    }
}

impl fmt::Display for GamificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GamificationAction {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| RuleError::UnknownAction(s.to_string()))
    }
}

/// Build the ledger dedupe key `ACTION:user:scope|none:suffix`.
///
/// `scope` is usually the event id; badge bonuses scope to the badge code.
pub fn dedupe_key(
    action: GamificationAction,
    user_id: i64,
    scope: Option<&str>,
    suffix: Option<&str>,
) -> String {
    let suffix = match suffix {
        Some(s) if !s.is_empty() => s,
        _ => DEFAULT_DEDUPE_SUFFIX,
    };
    format!(
        "{}:{}:{}:{}",
        action.as_str(),
        user_id,
        scope.unwrap_or("none"),
        suffix
    )
}

/// Resolve the points for an award: explicit override, then setting, then catalog.
pub fn resolve_points(
    action: GamificationAction,
    points_override: Option<i64>,
    setting: Option<i64>,
) -> i64 {
    points_override
        .or(setting)
        .unwrap_or_else(|| action.config().points)
}
