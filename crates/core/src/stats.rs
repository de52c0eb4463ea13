use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::level::LevelProgress;
use crate::rules::StatsDelta;
use crate::streak::StreakState;

/// Aggregate reward projection for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGamificationStats {
    pub user_id: i64,
    pub total_points: i64,
    pub lifetime_points: i64,
    pub current_level: i64,
    pub points_to_next_level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_streak_event: Option<DateTime<Utc>>,
    pub events_registered: i64,
    pub events_attended: i64,
    pub events_hosted: i64,
    pub badges_earned: i64,
    pub last_rewarded_at: Option<DateTime<Utc>>,
    pub last_badge_awarded_at: Option<DateTime<Utc>>,
}

impl UserGamificationStats {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            total_points: 0,
            lifetime_points: 0,
            current_level: 1,
            points_to_next_level: 0,
            current_streak: 0,
            longest_streak: 0,
            last_streak_event: None,
            events_registered: 0,
            events_attended: 0,
            events_hosted: 0,
            badges_earned: 0,
            last_rewarded_at: None,
            last_badge_awarded_at: None,
        }
    }

    /// Apply one ledger entry. Totals and counters floor at zero and only the
    /// positive part of `points_delta` accrues to lifetime points.
    pub fn apply_award(&mut self, points_delta: i64, delta: StatsDelta, now: DateTime<Utc>) {
        self.total_points = (self.total_points + points_delta).max(0);
        self.lifetime_points += points_delta.max(0);
        self.events_registered = (self.events_registered + delta.events_registered).max(0);
        self.events_attended = (self.events_attended + delta.events_attended).max(0);
        self.events_hosted = (self.events_hosted + delta.events_hosted).max(0);
        self.last_rewarded_at = Some(now);
    }

    pub fn streak(&self) -> StreakState {
        StreakState {
            current: self.current_streak,
            longest: self.longest_streak,
            last_event: self.last_streak_event,
        }
    }

    pub fn set_streak(&mut self, streak: StreakState) {
        self.current_streak = streak.current;
        self.longest_streak = streak.longest;
        self.last_streak_event = streak.last_event;
    }

    pub fn set_level(&mut self, progress: &LevelProgress) {
        self.current_level = progress.level;
        self.points_to_next_level = progress.points_to_next;
    }
}
