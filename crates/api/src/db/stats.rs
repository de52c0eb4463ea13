//! Per-user aggregate statistics query builders.

use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};

use super::tables::UserGamificationStats;

pub type Built = (String, sea_query::Values);

/// Create a zeroed stats row if none exists.
pub fn ensure(user_id: i64, now: &str) -> Built {
    Query::insert()
        .into_table(UserGamificationStats::Table)
        .columns([UserGamificationStats::UserId, UserGamificationStats::UpdatedAt])
        .values_panic([user_id.into(), now.into()])
        .on_conflict(
            OnConflict::column(UserGamificationStats::UserId)
                .do_nothing()
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

pub fn get(user_id: i64) -> Built {
    Query::select()
        .columns([
            UserGamificationStats::UserId,
            UserGamificationStats::TotalPoints,
            UserGamificationStats::LifetimePoints,
            UserGamificationStats::CurrentLevel,
            UserGamificationStats::PointsToNextLevel,
            UserGamificationStats::CurrentStreak,
            UserGamificationStats::LongestStreak,
            UserGamificationStats::LastStreakEvent,
            UserGamificationStats::EventsRegistered,
            UserGamificationStats::EventsAttended,
            UserGamificationStats::EventsHosted,
            UserGamificationStats::BadgesEarned,
            UserGamificationStats::LastRewardedAt,
            UserGamificationStats::LastBadgeAwardedAt,
        ])
        .from(UserGamificationStats::Table)
        .and_where(Expr::col(UserGamificationStats::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

/// Column values for a full stats write, timestamps already formatted.
pub struct StatsRow<'a> {
    pub user_id: i64,
    pub total_points: i64,
    pub lifetime_points: i64,
    pub current_level: i64,
    pub points_to_next_level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_streak_event: Option<&'a str>,
    pub events_registered: i64,
    pub events_attended: i64,
    pub events_hosted: i64,
    pub badges_earned: i64,
    pub last_rewarded_at: Option<&'a str>,
    pub last_badge_awarded_at: Option<&'a str>,
    pub updated_at: &'a str,
}

/// Overwrite every aggregate column of one user's row.
pub fn update(row: &StatsRow<'_>) -> Built {
    Query::update()
        .table(UserGamificationStats::Table)
        .values([
            (UserGamificationStats::TotalPoints, row.total_points.into()),
            (UserGamificationStats::LifetimePoints, row.lifetime_points.into()),
            (UserGamificationStats::CurrentLevel, row.current_level.into()),
            (
                UserGamificationStats::PointsToNextLevel,
                row.points_to_next_level.into(),
            ),
            (UserGamificationStats::CurrentStreak, row.current_streak.into()),
            (UserGamificationStats::LongestStreak, row.longest_streak.into()),
            (
                UserGamificationStats::LastStreakEvent,
                row.last_streak_event.map(str::to_string).into(),
            ),
            (
                UserGamificationStats::EventsRegistered,
                row.events_registered.into(),
            ),
            (UserGamificationStats::EventsAttended, row.events_attended.into()),
            (UserGamificationStats::EventsHosted, row.events_hosted.into()),
            (UserGamificationStats::BadgesEarned, row.badges_earned.into()),
            (
                UserGamificationStats::LastRewardedAt,
                row.last_rewarded_at.map(str::to_string).into(),
            ),
            (
                UserGamificationStats::LastBadgeAwardedAt,
                row.last_badge_awarded_at.map(str::to_string).into(),
            ),
            (UserGamificationStats::UpdatedAt, row.updated_at.into()),
        ])
        .and_where(Expr::col(UserGamificationStats::UserId).eq(row.user_id))
        .build(SqliteQueryBuilder)
}

/// Add one to `badges_earned` and stamp the award time.
pub fn increment_badges(user_id: i64, now: &str) -> Built {
    Query::update()
        .table(UserGamificationStats::Table)
        .value(
            UserGamificationStats::BadgesEarned,
            Expr::col(UserGamificationStats::BadgesEarned).add(1),
        )
        .value(UserGamificationStats::LastBadgeAwardedAt, now)
        .value(UserGamificationStats::UpdatedAt, now)
        .and_where(Expr::col(UserGamificationStats::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_is_idempotent_insert() {
        let (sql, values) = ensure(4, "now");
        assert!(sql.starts_with("INSERT INTO \"user_gamification_stats\""), "{sql}");
        assert!(sql.contains("DO NOTHING"), "{sql}");
        assert_eq!(values.0.len(), 2);
    }

    #[test]
    fn increment_badges_is_relative() {
        let (sql, _) = increment_badges(4, "now");
        assert!(sql.contains("\"badges_earned\" +"), "{sql}");
    }
}
