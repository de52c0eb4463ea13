//! Append-only point ledger and the per-user aggregates derived from it.

use chrono::{DateTime, Duration, Utc};
use rollcall_api::db::{
    achievements as achievement_sql, ledger as ledger_sql, levels as level_sql,
    participants as participant_sql, stats as stats_sql,
};
use rollcall_api::{LeaderboardEntry, LeaderboardPeriod, LedgerEntry};
use rollcall_core::{
    GamificationAction, LevelTable, LevelThreshold, ParticipationStatus, UserGamificationStats,
};
use rusqlite::{Connection, Row};

use crate::error::Result;
use crate::sql::{self, fmt_ts, opt_ts_col, parsed_col, ts_col};

pub const MAX_LEADERBOARD_LIMIT: u32 = 50;
pub const MONTHLY_WINDOW_DAYS: i64 = 30;
pub const RECENT_ENTRIES: u64 = 10;

/// One row to append to the ledger.
pub struct NewLedgerEntry<'a> {
    pub user_id: i64,
    pub event_id: Option<i64>,
    pub action: GamificationAction,
    pub points_delta: i64,
    pub metadata: Option<&'a serde_json::Value>,
    pub dedupe_key: &'a str,
}

/// Append an entry unless its dedupe key already exists.
/// Returns false for a duplicate.
pub fn insert_entry(conn: &Connection, entry: &NewLedgerEntry<'_>, now: DateTime<Utc>) -> Result<bool> {
    let metadata = entry.metadata.map(serde_json::to_string).transpose()?;
    let inserted = sql::execute(
        conn,
        ledger_sql::insert_ignore(
            entry.user_id,
            entry.event_id,
            entry.action.as_str(),
            entry.points_delta,
            metadata.as_deref(),
            entry.dedupe_key,
            &fmt_ts(now),
        ),
    )?;
    Ok(inserted > 0)
}

pub fn has_key(conn: &Connection, dedupe_key: &str) -> Result<bool> {
    Ok(sql::query_count(conn, ledger_sql::count_by_key(dedupe_key))? > 0)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let metadata: Option<String> = row.get("metadata")?;
    Ok(LedgerEntry {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        event_id: row.get("event_id")?,
        action: parsed_col(row, "action")?,
        points_delta: row.get("points_delta")?,
        // Metadata is informational; an unreadable blob is dropped, not fatal.
        metadata: metadata.and_then(|raw| serde_json::from_str(&raw).ok()),
        dedupe_key: row.get("dedupe_key")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub fn recent(conn: &Connection, user_id: i64, limit: u64) -> Result<Vec<LedgerEntry>> {
    Ok(sql::query_all(conn, ledger_sql::recent(user_id, limit), entry_from_row)?)
}

// ─── Stats ──────────────────────────────────────────────────────────────────

fn stats_from_row(row: &Row<'_>) -> rusqlite::Result<UserGamificationStats> {
    Ok(UserGamificationStats {
        user_id: row.get("user_id")?,
        total_points: row.get("total_points")?,
        lifetime_points: row.get("lifetime_points")?,
        current_level: row.get("current_level")?,
        points_to_next_level: row.get("points_to_next_level")?,
        current_streak: row.get("current_streak")?,
        longest_streak: row.get("longest_streak")?,
        last_streak_event: opt_ts_col(row, "last_streak_event")?,
        events_registered: row.get("events_registered")?,
        events_attended: row.get("events_attended")?,
        events_hosted: row.get("events_hosted")?,
        badges_earned: row.get("badges_earned")?,
        last_rewarded_at: opt_ts_col(row, "last_rewarded_at")?,
        last_badge_awarded_at: opt_ts_col(row, "last_badge_awarded_at")?,
    })
}

pub fn load_stats(conn: &Connection, user_id: i64) -> Result<Option<UserGamificationStats>> {
    Ok(sql::query_opt(conn, stats_sql::get(user_id), stats_from_row)?)
}

/// Load the user's stats, creating a zeroed row first if needed.
pub fn ensure_stats(conn: &Connection, user_id: i64, now: DateTime<Utc>) -> Result<UserGamificationStats> {
    sql::execute(conn, stats_sql::ensure(user_id, &fmt_ts(now)))?;
    Ok(load_stats(conn, user_id)?.unwrap_or_else(|| UserGamificationStats::new(user_id)))
}

pub fn save_stats(conn: &Connection, stats: &UserGamificationStats, now: DateTime<Utc>) -> Result<()> {
    let last_streak_event = stats.last_streak_event.map(fmt_ts);
    let last_rewarded_at = stats.last_rewarded_at.map(fmt_ts);
    let last_badge_awarded_at = stats.last_badge_awarded_at.map(fmt_ts);
    let updated_at = fmt_ts(now);
    sql::execute(
        conn,
        stats_sql::update(&stats_sql::StatsRow {
            user_id: stats.user_id,
            total_points: stats.total_points,
            lifetime_points: stats.lifetime_points,
            current_level: stats.current_level,
            points_to_next_level: stats.points_to_next_level,
            current_streak: stats.current_streak,
            longest_streak: stats.longest_streak,
            last_streak_event: last_streak_event.as_deref(),
            events_registered: stats.events_registered,
            events_attended: stats.events_attended,
            events_hosted: stats.events_hosted,
            badges_earned: stats.badges_earned,
            last_rewarded_at: last_rewarded_at.as_deref(),
            last_badge_awarded_at: last_badge_awarded_at.as_deref(),
            updated_at: &updated_at,
        }),
    )?;
    Ok(())
}

// ─── Levels ─────────────────────────────────────────────────────────────────

pub fn level_thresholds(conn: &Connection) -> Result<Vec<LevelThreshold>> {
    Ok(sql::query_all(conn, level_sql::list(), |row| {
        Ok(LevelThreshold {
            level: row.get("level")?,
            points_cumulative: row.get("points_cumulative")?,
            reward_title: row.get("reward_title")?,
        })
    })?)
}

/// The configured table when one is set, otherwise the stored thresholds.
pub fn level_table(conn: &Connection, configured: Option<&LevelTable>) -> Result<LevelTable> {
    match configured {
        Some(table) => Ok(table.clone()),
        None => Ok(LevelTable::new(level_thresholds(conn)?)?),
    }
}

// ─── Leaderboard ────────────────────────────────────────────────────────────

pub fn leaderboard(
    conn: &Connection,
    period: LeaderboardPeriod,
    limit: u32,
    now: DateTime<Utc>,
) -> Result<Vec<LeaderboardEntry>> {
    let limit = u64::from(limit.clamp(1, MAX_LEADERBOARD_LIMIT));
    let built = match period {
        LeaderboardPeriod::All => ledger_sql::leaderboard_all(limit),
        LeaderboardPeriod::Monthly => {
            let since = now - Duration::days(MONTHLY_WINDOW_DAYS);
            ledger_sql::leaderboard_since(&fmt_ts(since), limit)
        }
    };
    let rows = sql::query_all(conn, built, |row| {
        Ok((
            row.get::<_, i64>("user_id")?,
            row.get::<_, i64>("points")?,
            row.get::<_, i64>("current_level")?,
        ))
    })?;
    Ok(rows
        .into_iter()
        .zip(1u32..)
        .map(|((user_id, points, level), rank)| LeaderboardEntry {
            rank,
            user_id,
            points,
            level,
        })
        .collect())
}

// ─── Recalculation ──────────────────────────────────────────────────────────

/// Rebuild a user's totals and counters from the ledger, participant rows,
/// hosted events, and badge grants. Streak state is kept as is.
pub fn recalculate_user(
    conn: &Connection,
    user_id: i64,
    levels: &LevelTable,
    now: DateTime<Utc>,
) -> Result<UserGamificationStats> {
    let mut stats = ensure_stats(conn, user_id, now)?;

    let deltas = sql::query_all(conn, ledger_sql::deltas_in_order(user_id), |row| {
        row.get::<_, i64>("points_delta")
    })?;
    // Same per-step floor as live awards, so the rebuilt total matches.
    stats.total_points = 0;
    stats.lifetime_points = 0;
    for delta in deltas {
        stats.total_points = (stats.total_points + delta).max(0);
        stats.lifetime_points += delta.max(0);
    }
    stats.events_registered = sql::query_count(
        conn,
        participant_sql::count_by_status(
            user_id,
            &[
                ParticipationStatus::Registered.as_str(),
                ParticipationStatus::Waitlisted.as_str(),
            ],
        ),
    )?;
    stats.events_attended = sql::query_count(
        conn,
        participant_sql::count_by_status(user_id, &[ParticipationStatus::Attended.as_str()]),
    )?;
    stats.events_hosted = sql::query_count(conn, participant_sql::hosted_count(user_id))?;
    stats.badges_earned = sql::query_count(conn, achievement_sql::count_grants(user_id))?;
    stats.set_level(&levels.resolve(stats.lifetime_points));

    save_stats(conn, &stats, now)?;
    tracing::info!(
        user_id,
        total_points = stats.total_points,
        level = stats.current_level,
        "Recalculated stats"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use rollcall_core::testing::{event_start, small_level_table};

    fn entry(user_id: i64, action: GamificationAction, points: i64, key: &str) -> NewLedgerEntry<'_> {
        NewLedgerEntry {
            user_id,
            event_id: None,
            action,
            points_delta: points,
            metadata: None,
            dedupe_key: key,
        }
    }

    #[test]
    fn duplicate_keys_are_ignored() {
        let db = test_db();
        db.with_tx(|tx| {
            let e = entry(1, GamificationAction::EventAttend, 40, "EVENT_ATTEND:1:5:x");
            assert!(insert_entry(tx, &e, event_start())?);
            assert!(!insert_entry(tx, &e, event_start())?);
            assert!(has_key(tx, "EVENT_ATTEND:1:5:x")?);
            assert_eq!(recent(tx, 1, 10)?.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let db = test_db();
        let meta = serde_json::json!({"source": "kiosk"});
        let entries = db
            .with_tx(|tx| {
                let mut e = entry(2, GamificationAction::EventRegister, 10, "k");
                e.metadata = Some(&meta);
                insert_entry(tx, &e, event_start())?;
                recent(tx, 2, 10)
            })
            .unwrap();
        assert_eq!(entries[0].metadata.as_ref(), Some(&meta));
        assert_eq!(entries[0].action, GamificationAction::EventRegister);
    }

    #[test]
    fn stats_round_trip() {
        let db = test_db();
        let loaded = db
            .with_tx(|tx| {
                let mut stats = ensure_stats(tx, 3, event_start())?;
                assert_eq!(stats.current_level, 1);
                stats.total_points = 70;
                stats.lifetime_points = 80;
                stats.last_streak_event = Some(event_start());
                save_stats(tx, &stats, event_start())?;
                load_stats(tx, 3)
            })
            .unwrap()
            .unwrap();
        assert_eq!(loaded.total_points, 70);
        assert_eq!(loaded.last_streak_event, Some(event_start()));
    }

    #[test]
    fn seeded_level_table_loads() {
        let db = test_db();
        let table = db.with_conn(|conn| level_table(conn, None)).unwrap();
        assert_eq!(table.thresholds().len(), 10);
        assert_eq!(table.resolve(0).level, 1);
        let small = small_level_table();
        let configured = db.with_conn(|conn| level_table(conn, Some(&small))).unwrap();
        assert_eq!(configured.resolve(250).level, 3);
    }

    #[test]
    fn recalculation_rebuilds_from_ledger() {
        let db = test_db();
        let stats = db
            .with_tx(|tx| {
                insert_entry(tx, &entry(4, GamificationAction::EventAttend, 240, "a"), event_start())?;
                insert_entry(tx, &entry(4, GamificationAction::EventCancel, -5, "b"), event_start())?;
                recalculate_user(tx, 4, &small_level_table(), event_start())
            })
            .unwrap();
        assert_eq!(stats.total_points, 235);
        assert_eq!(stats.lifetime_points, 240);
        assert_eq!(stats.current_level, 3);
        assert_eq!(stats.points_to_next_level, 60);
    }

    #[test]
    fn recalculation_floors_each_step_like_live_awards() {
        let db = test_db();
        let now = event_start();
        let stats = db
            .with_tx(|tx| {
                // Written out of order; replay follows created_at.
                insert_entry(tx, &entry(6, GamificationAction::EventAttend, 10, "c"), now + Duration::minutes(2))?;
                insert_entry(tx, &entry(6, GamificationAction::WaitlistJoin, 3, "a"), now)?;
                insert_entry(tx, &entry(6, GamificationAction::EventCancel, -5, "b"), now + Duration::minutes(1))?;
                recalculate_user(tx, 6, &small_level_table(), now + Duration::minutes(3))
            })
            .unwrap();
        // 3, then max(3 - 5, 0) = 0, then 10.
        assert_eq!(stats.total_points, 10);
        assert_eq!(stats.lifetime_points, 13);

        let mut live = UserGamificationStats::new(6);
        for delta in [3, -5, 10] {
            live.apply_award(delta, Default::default(), now);
        }
        assert_eq!(live.total_points, stats.total_points);
    }

    #[test]
    fn leaderboard_ranks_and_clamps() {
        let db = test_db();
        let now = event_start();
        let board = db
            .with_tx(|tx| {
                for (user, points) in [(1, 30), (2, 90), (3, 60)] {
                    insert_entry(tx, &entry(user, GamificationAction::EventAttend, points, &format!("k{user}")), now)?;
                    let mut stats = ensure_stats(tx, user, now)?;
                    stats.total_points = points;
                    save_stats(tx, &stats, now)?;
                }
                insert_entry(
                    tx,
                    &entry(1, GamificationAction::EventAttend, 500, "old"),
                    now - Duration::days(45),
                )?;
                Ok((
                    leaderboard(tx, LeaderboardPeriod::All, 0, now)?,
                    leaderboard(tx, LeaderboardPeriod::Monthly, 10, now)?,
                ))
            })
            .unwrap();
        let (all, monthly) = board;
        assert_eq!(all.len(), 1);
        assert_eq!((all[0].rank, all[0].user_id), (1, 2));
        assert_eq!(
            monthly.iter().map(|e| (e.rank, e.user_id, e.points)).collect::<Vec<_>>(),
            vec![(1, 2, 90), (2, 3, 60), (3, 1, 30)]
        );
    }
}
