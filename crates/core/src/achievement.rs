//! Badge tiers, the named-achievement catalog and catalog threshold predicates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;
use crate::stats::UserGamificationStats;

// ─── Badge level ────────────────────────────────────────────────────────────

/// Tier reached on a named achievement. Ordered so that `max` never regresses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BadgeLevel {
    #[default]
    None,
    Bronze,
    Silver,
    Gold,
}

impl BadgeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }
}

impl fmt::Display for BadgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BadgeLevel {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(Self::None),
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            other => Err(RuleError::UnknownStatus {
                kind: "badge level",
                value: other.to_string(),
            }),
        }
    }
}

// ─── Tiers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub bronze: i64,
    pub silver: i64,
    pub gold: i64,
}

impl TierThresholds {
    /// Thresholds must be positive and strictly increasing.
    pub fn validated(self, code: &str) -> Result<Self, RuleError> {
        if self.bronze > 0 && self.bronze < self.silver && self.silver < self.gold {
            Ok(self)
        } else {
            Err(RuleError::InvalidThresholds {
                code: code.to_string(),
                bronze: self.bronze,
                silver: self.silver,
                gold: self.gold,
            })
        }
    }

    pub fn level_for(&self, count: i64) -> BadgeLevel {
        if count >= self.gold {
            BadgeLevel::Gold
        } else if count >= self.silver {
            BadgeLevel::Silver
        } else if count >= self.bronze {
            BadgeLevel::Bronze
        } else {
            BadgeLevel::None
        }
    }
}

/// Bonus points per tier. `single` applies when a tier has no own entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bronze: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silver: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<i64>,
}

impl TierPoints {
    pub fn for_level(&self, level: BadgeLevel) -> i64 {
        let tier = match level {
            BadgeLevel::None => None,
            BadgeLevel::Bronze => self.bronze,
            BadgeLevel::Silver => self.silver,
            BadgeLevel::Gold => self.gold,
        };
        tier.or(self.single).unwrap_or(0)
    }
}

/// Bonus for reaching `level`: the tier table when one exists, else the flat points.
pub fn tier_bonus(tier_points: Option<&TierPoints>, achievement_points: i64, level: BadgeLevel) -> i64 {
    match tier_points {
        Some(tiers) => tiers.for_level(level),
        None => achievement_points,
    }
}

// ─── Named achievements ─────────────────────────────────────────────────────

/// What causes a named achievement to make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementTrigger {
    EventCompleted,
    OcrApproved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCode {
    PunctualPro,
    OcrWizard,
    EarlyBird,
    CommunityStaple,
    PerfectStreak,
}

impl AchievementCode {
    pub const ALL: [AchievementCode; 5] = [
        Self::PunctualPro,
        Self::OcrWizard,
        Self::EarlyBird,
        Self::CommunityStaple,
        Self::PerfectStreak,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PunctualPro => "punctual_pro",
            Self::OcrWizard => "ocr_wizard",
            Self::EarlyBird => "early_bird",
            Self::CommunityStaple => "community_staple",
            Self::PerfectStreak => "perfect_streak",
        }
    }

    pub fn trigger(&self) -> AchievementTrigger {
        match self {
            Self::OcrWizard => AchievementTrigger::OcrApproved,
            _ => AchievementTrigger::EventCompleted,
        }
    }

    /// Built-in thresholds used when the catalog row carries none.
    pub fn default_thresholds(&self) -> TierThresholds {
        let (bronze, silver, gold) = match self {
            Self::PunctualPro => (1, 10, 25),
            Self::OcrWizard => (1, 5, 15),
            Self::EarlyBird => (1, 5, 10),
            Self::CommunityStaple => (2, 5, 10),
            Self::PerfectStreak => (3, 7, 15),
        };
        TierThresholds {
            bronze,
            silver,
            gold,
        }
    }
}

impl fmt::Display for AchievementCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementCode {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| RuleError::UnknownAchievement(s.to_string()))
    }
}

// ─── Catalog thresholds ─────────────────────────────────────────────────────

/// Aggregate stat a catalog badge is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdKind {
    Points,
    EventRegister,
    EventAttend,
    EventHost,
    StreakDays,
}

impl ThresholdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "POINTS",
            Self::EventRegister => "EVENT_REGISTER",
            Self::EventAttend => "EVENT_ATTEND",
            Self::EventHost => "EVENT_HOST",
            Self::StreakDays => "STREAK_DAYS",
        }
    }

    fn observed(&self, stats: &UserGamificationStats) -> i64 {
        match self {
            Self::Points => stats.total_points,
            Self::EventRegister => stats.events_registered,
            Self::EventAttend => stats.events_attended,
            Self::EventHost => stats.events_hosted,
            Self::StreakDays => stats.longest_streak,
        }
    }

    pub fn meets(&self, threshold: i64, stats: &UserGamificationStats) -> bool {
        self.observed(stats) >= threshold
    }
}

impl FromStr for ThresholdKind {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POINTS" => Ok(Self::Points),
            "EVENT_REGISTER" => Ok(Self::EventRegister),
            "EVENT_ATTEND" => Ok(Self::EventAttend),
            "EVENT_HOST" => Ok(Self::EventHost),
            "STREAK_DAYS" => Ok(Self::StreakDays),
            other => Err(RuleError::UnknownThresholdKind(other.to_string())),
        }
    }
}
