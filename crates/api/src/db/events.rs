//! Event query builders.

use rollcall_core::EventStatus;
use sea_query::{Expr, Order, Query, SelectStatement, SqliteQueryBuilder};

use super::tables::Events;

pub type Built = (String, sea_query::Values);

/// Everything a new event row needs.
pub struct NewEvent<'a> {
    pub uid: &'a str,
    pub title: &'a str,
    pub event_type: Option<&'a str>,
    pub status: &'a str,
    pub start_at: &'a str,
    pub end_at: &'a str,
    pub checkin_window_mins: Option<i64>,
    pub grace_mins: Option<i64>,
    pub created_by: Option<i64>,
}

/// INSERT a new event.
pub fn insert(event: &NewEvent<'_>) -> Built {
    Query::insert()
        .into_table(Events::Table)
        .columns([
            Events::Uid,
            Events::Title,
            Events::EventType,
            Events::Status,
            Events::StartAt,
            Events::EndAt,
            Events::CheckinWindowMins,
            Events::GraceMins,
            Events::CreatedBy,
        ])
        .values_panic([
            event.uid.into(),
            event.title.into(),
            event.event_type.map(str::to_string).into(),
            event.status.into(),
            event.start_at.into(),
            event.end_at.into(),
            event.checkin_window_mins.into(),
            event.grace_mins.into(),
            event.created_by.into(),
        ])
        .build(SqliteQueryBuilder)
}

fn base_select() -> SelectStatement {
    Query::select()
        .columns([
            Events::EventId,
            Events::Uid,
            Events::Title,
            Events::EventType,
            Events::Status,
            Events::StartAt,
            Events::EndAt,
            Events::CheckinWindowMins,
            Events::GraceMins,
            Events::CreatedBy,
        ])
        .from(Events::Table)
        .to_owned()
}

pub fn get(event_id: i64) -> Built {
    base_select()
        .and_where(Expr::col(Events::EventId).eq(event_id))
        .build(SqliteQueryBuilder)
}

pub fn get_by_uid(uid: &str) -> Built {
    base_select()
        .and_where(Expr::col(Events::Uid).eq(uid))
        .build(SqliteQueryBuilder)
}

/// Published events whose start time has passed.
pub fn due_to_start(now: &str) -> Built {
    base_select()
        .and_where(Expr::col(Events::Status).eq("published"))
        .and_where(Expr::col(Events::StartAt).lte(now))
        .order_by(Events::StartAt, Order::Asc)
        .order_by(Events::EventId, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Ended events that are not already completed, cancelled, or archived.
pub fn due_to_complete(now: &str) -> Built {
    let terminal = EventStatus::TERMINAL.iter().map(EventStatus::as_str);
    base_select()
        .and_where(Expr::col(Events::Status).is_not_in(terminal))
        .and_where(Expr::col(Events::EndAt).lte(now))
        .order_by(Events::EndAt, Order::Asc)
        .order_by(Events::EventId, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Move an event from `from` to `to`. Affects zero rows if the status moved on.
pub fn transition_status(event_id: i64, from: &[&str], to: &str, now: &str) -> Built {
    Query::update()
        .table(Events::Table)
        .value(Events::Status, to)
        .value(Events::UpdatedAt, now)
        .and_where(Expr::col(Events::EventId).eq(event_id))
        .and_where(Expr::col(Events::Status).is_in(from.iter().copied()))
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_to_complete_skips_terminal_events() {
        let (sql, values) = due_to_complete("2026-03-14T20:00:00.000Z");
        assert!(sql.contains("\"status\" NOT IN (?, ?, ?)"), "{sql}");
        assert!(sql.contains("\"end_at\" <= ?"), "{sql}");
        assert_eq!(values.0.len(), 4);
    }

    #[test]
    fn transition_guards_on_previous_status() {
        let (sql, values) = transition_status(4, &["published"], "ongoing", "now");
        assert!(sql.starts_with("UPDATE \"events\""), "{sql}");
        assert!(sql.contains("\"status\" IN (?)"), "{sql}");
        assert_eq!(values.0.len(), 4);
    }
}
