//! Attendance audit trail query builders.

use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};

use super::tables::EventAttendanceAudit;

pub type Built = (String, sea_query::Values);

/// One audit row to append.
pub struct NewAuditEntry<'a> {
    pub event_id: i64,
    pub participant_id: i64,
    pub user_id: Option<i64>,
    pub marked_by: Option<i64>,
    pub action: &'a str,
    pub previous_status: Option<&'a str>,
    pub new_status: &'a str,
    pub reason: Option<&'a str>,
    pub dedupe_key: Option<&'a str>,
    pub performed_at: &'a str,
}

/// INSERT an audit row. Rows carrying an already-used dedupe key are ignored.
pub fn insert(entry: &NewAuditEntry<'_>) -> Built {
    Query::insert()
        .into_table(EventAttendanceAudit::Table)
        .columns([
            EventAttendanceAudit::EventId,
            EventAttendanceAudit::ParticipantId,
            EventAttendanceAudit::UserId,
            EventAttendanceAudit::MarkedBy,
            EventAttendanceAudit::Action,
            EventAttendanceAudit::PreviousStatus,
            EventAttendanceAudit::NewStatus,
            EventAttendanceAudit::Reason,
            EventAttendanceAudit::DedupeKey,
            EventAttendanceAudit::PerformedAt,
        ])
        .values_panic([
            entry.event_id.into(),
            entry.participant_id.into(),
            entry.user_id.into(),
            entry.marked_by.into(),
            entry.action.into(),
            entry.previous_status.map(str::to_string).into(),
            entry.new_status.into(),
            entry.reason.map(str::to_string).into(),
            entry.dedupe_key.map(str::to_string).into(),
            entry.performed_at.into(),
        ])
        .on_conflict(
            OnConflict::column(EventAttendanceAudit::DedupeKey)
                .do_nothing()
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

/// Audit rows for an event, newest first.
pub fn list(
    event_id: i64,
    participant_id: Option<i64>,
    before: Option<&str>,
    limit: u64,
) -> Built {
    let mut select = Query::select();
    select
        .columns([
            EventAttendanceAudit::AuditId,
            EventAttendanceAudit::EventId,
            EventAttendanceAudit::ParticipantId,
            EventAttendanceAudit::UserId,
            EventAttendanceAudit::MarkedBy,
            EventAttendanceAudit::Action,
            EventAttendanceAudit::PreviousStatus,
            EventAttendanceAudit::NewStatus,
            EventAttendanceAudit::Reason,
            EventAttendanceAudit::PerformedAt,
        ])
        .from(EventAttendanceAudit::Table)
        .and_where(Expr::col(EventAttendanceAudit::EventId).eq(event_id));
    if let Some(participant_id) = participant_id {
        select.and_where(Expr::col(EventAttendanceAudit::ParticipantId).eq(participant_id));
    }
    if let Some(before) = before {
        select.and_where(Expr::col(EventAttendanceAudit::PerformedAt).lt(before));
    }
    select
        .order_by(EventAttendanceAudit::PerformedAt, Order::Desc)
        .order_by(EventAttendanceAudit::AuditId, Order::Desc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_ignores_duplicate_dedupe_keys() {
        let (sql, values) = insert(&NewAuditEntry {
            event_id: 1,
            participant_id: 2,
            user_id: None,
            marked_by: None,
            action: "mark_absent",
            previous_status: Some("unknown"),
            new_status: "absent",
            reason: Some("auto-absent"),
            dedupe_key: Some("auto-absent:2"),
            performed_at: "2026-03-14T20:00:00.000Z",
        });
        assert!(sql.contains("ON CONFLICT"), "{sql}");
        assert!(sql.contains("DO NOTHING"), "{sql}");
        assert_eq!(values.0.len(), 10);
    }

    #[test]
    fn list_applies_optional_filters() {
        let (plain, plain_values) = list(1, None, None, 100);
        assert!(!plain.contains("\"participant_id\" ="), "{plain}");
        assert_eq!(plain_values.0.len(), 2);

        let (filtered, values) = list(1, Some(3), Some("2026-03-14T20:00:00.000Z"), 10);
        assert!(filtered.contains("\"participant_id\" = ?"), "{filtered}");
        assert!(filtered.contains("\"performed_at\" < ?"), "{filtered}");
        assert!(filtered.contains("ORDER BY \"performed_at\" DESC"), "{filtered}");
        assert_eq!(values.0.len(), 4);
    }
}
