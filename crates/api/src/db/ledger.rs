//! Point ledger query builders.

use sea_query::{Alias, Expr, Func, JoinType, OnConflict, Order, Query, SqliteQueryBuilder};

use super::tables::{GamificationEvents, UserGamificationStats};

pub type Built = (String, sea_query::Values);

/// Insert-ignore a ledger entry keyed by `dedupe_key`.
/// Zero affected rows means the award already happened.
pub fn insert_ignore(
    user_id: i64,
    event_id: Option<i64>,
    action: &str,
    points_delta: i64,
    metadata: Option<&str>,
    dedupe_key: &str,
    created_at: &str,
) -> Built {
    Query::insert()
        .into_table(GamificationEvents::Table)
        .columns([
            GamificationEvents::UserId,
            GamificationEvents::EventId,
            GamificationEvents::Action,
            GamificationEvents::PointsDelta,
            GamificationEvents::Metadata,
            GamificationEvents::DedupeKey,
            GamificationEvents::CreatedAt,
        ])
        .values_panic([
            user_id.into(),
            event_id.into(),
            action.into(),
            points_delta.into(),
            metadata.map(str::to_string).into(),
            dedupe_key.into(),
            created_at.into(),
        ])
        .on_conflict(
            OnConflict::column(GamificationEvents::DedupeKey)
                .do_nothing()
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

/// Most recent ledger entries for a user.
pub fn recent(user_id: i64, limit: u64) -> Built {
    Query::select()
        .columns([
            GamificationEvents::Id,
            GamificationEvents::UserId,
            GamificationEvents::EventId,
            GamificationEvents::Action,
            GamificationEvents::PointsDelta,
            GamificationEvents::Metadata,
            GamificationEvents::DedupeKey,
            GamificationEvents::CreatedAt,
        ])
        .from(GamificationEvents::Table)
        .and_where(Expr::col(GamificationEvents::UserId).eq(user_id))
        .order_by(GamificationEvents::CreatedAt, Order::Desc)
        .order_by(GamificationEvents::Id, Order::Desc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}

/// Count ledger rows for a dedupe key (0 or 1).
pub fn count_by_key(dedupe_key: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(GamificationEvents::Id)))
        .from(GamificationEvents::Table)
        .and_where(Expr::col(GamificationEvents::DedupeKey).eq(dedupe_key))
        .build(SqliteQueryBuilder)
}

/// A user's point deltas in the order they were written.
pub fn deltas_in_order(user_id: i64) -> Built {
    Query::select()
        .column(GamificationEvents::PointsDelta)
        .from(GamificationEvents::Table)
        .and_where(Expr::col(GamificationEvents::UserId).eq(user_id))
        .order_by(GamificationEvents::CreatedAt, Order::Asc)
        .order_by(GamificationEvents::Id, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Users ranked by current point balance.
pub fn leaderboard_all(limit: u64) -> Built {
    Query::select()
        .column(UserGamificationStats::UserId)
        .expr_as(
            Expr::col(UserGamificationStats::TotalPoints),
            Alias::new("points"),
        )
        .column(UserGamificationStats::CurrentLevel)
        .from(UserGamificationStats::Table)
        .order_by(UserGamificationStats::TotalPoints, Order::Desc)
        .order_by(UserGamificationStats::UserId, Order::Asc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}

/// Users ranked by points earned since `since`, positive totals only.
pub fn leaderboard_since(since: &str, limit: u64) -> Built {
    let points = || Func::sum(Expr::col((Alias::new("ge"), GamificationEvents::PointsDelta)));
    Query::select()
        .column((Alias::new("ge"), GamificationEvents::UserId))
        .expr_as(points(), Alias::new("points"))
        .expr_as(
            Func::coalesce([
                Expr::col((Alias::new("s"), UserGamificationStats::CurrentLevel)).into(),
                Expr::val(1).into(),
            ]),
            Alias::new("current_level"),
        )
        .from_as(GamificationEvents::Table, Alias::new("ge"))
        .join_as(
            JoinType::LeftJoin,
            UserGamificationStats::Table,
            Alias::new("s"),
            Expr::col((Alias::new("s"), UserGamificationStats::UserId))
                .equals((Alias::new("ge"), GamificationEvents::UserId)),
        )
        .and_where(Expr::col((Alias::new("ge"), GamificationEvents::CreatedAt)).gte(since))
        .group_by_col((Alias::new("ge"), GamificationEvents::UserId))
        .and_having(Expr::expr(points()).gt(0))
        .order_by(Alias::new("points"), Order::Desc)
        .order_by((Alias::new("ge"), GamificationEvents::UserId), Order::Asc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_keyed_on_dedupe_key() {
        let (sql, values) = insert_ignore(
            1,
            Some(5),
            "EVENT_ATTEND",
            40,
            None,
            "EVENT_ATTEND:1:5:attendance-1",
            "2026-03-14T18:00:00.000Z",
        );
        assert!(sql.contains("ON CONFLICT"), "{sql}");
        assert!(sql.contains("DO NOTHING"), "{sql}");
        assert_eq!(values.0.len(), 7);
    }

    #[test]
    fn monthly_leaderboard_binds_window_and_limit() {
        let (sql, values) = leaderboard_since("2026-02-12T00:00:00.000Z", 20);
        assert!(sql.contains("LEFT JOIN"), "{sql}");
        assert!(sql.contains("GROUP BY"), "{sql}");
        assert!(sql.contains("HAVING SUM"), "{sql}");
        assert!(sql.contains("LIMIT ?"), "{sql}");
        // window, coalesce fallback, having floor, limit
        assert_eq!(values.0.len(), 4);
    }

    #[test]
    fn deltas_replay_oldest_first() {
        let (sql, values) = deltas_in_order(3);
        assert!(
            sql.contains("ORDER BY \"created_at\" ASC, \"id\" ASC"),
            "{sql}"
        );
        assert_eq!(values.0.len(), 1);
    }
}
