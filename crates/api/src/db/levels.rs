//! Level threshold query builders.

use sea_query::{Order, Query, SqliteQueryBuilder};

use super::tables::PointsLevelThresholds;

pub type Built = (String, sea_query::Values);

/// The full threshold table, lowest level first.
pub fn list() -> Built {
    Query::select()
        .columns([
            PointsLevelThresholds::Level,
            PointsLevelThresholds::PointsCumulative,
            PointsLevelThresholds::RewardTitle,
        ])
        .from(PointsLevelThresholds::Table)
        .order_by(PointsLevelThresholds::Level, Order::Asc)
        .build(SqliteQueryBuilder)
}
