//! Participant attendance query builders.

use sea_query::{
    Alias, Asterisk, Expr, Func, Order, Query, SelectStatement, SqliteQueryBuilder,
};

use super::tables::{EventParticipants, Events};

pub type Built = (String, sea_query::Values);

/// INSERT a registration. Attendance starts as `unknown`.
pub fn insert(event_id: i64, user_id: Option<i64>, status: &str, now: &str) -> Built {
    Query::insert()
        .into_table(EventParticipants::Table)
        .columns([
            EventParticipants::EventId,
            EventParticipants::UserId,
            EventParticipants::Status,
            EventParticipants::AttendanceStatus,
            EventParticipants::RegisteredAt,
        ])
        .values_panic([
            event_id.into(),
            user_id.into(),
            status.into(),
            "unknown".into(),
            now.into(),
        ])
        .build(SqliteQueryBuilder)
}

fn base_select() -> SelectStatement {
    Query::select()
        .columns([
            EventParticipants::ParticipantId,
            EventParticipants::EventId,
            EventParticipants::UserId,
            EventParticipants::Status,
            EventParticipants::AttendanceStatus,
            EventParticipants::AttendanceMarkedAt,
            EventParticipants::AttendanceMarkedBy,
            EventParticipants::AttendanceNotes,
            EventParticipants::AttendanceUpdatedAt,
        ])
        .from(EventParticipants::Table)
        .to_owned()
}

/// Lookup one participant, scoped to its event.
pub fn get(event_id: i64, participant_id: i64) -> Built {
    base_select()
        .and_where(Expr::col(EventParticipants::EventId).eq(event_id))
        .and_where(Expr::col(EventParticipants::ParticipantId).eq(participant_id))
        .build(SqliteQueryBuilder)
}

/// All participants of an event, by participant id.
pub fn list_for_event(event_id: i64) -> Built {
    base_select()
        .and_where(Expr::col(EventParticipants::EventId).eq(event_id))
        .order_by(EventParticipants::ParticipantId, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Write an attendance outcome.
pub fn set_attendance(
    participant_id: i64,
    status: &str,
    marked_by: Option<i64>,
    notes: Option<&str>,
    now: &str,
) -> Built {
    let mut update = Query::update();
    update
        .table(EventParticipants::Table)
        .value(EventParticipants::AttendanceStatus, status)
        .value(EventParticipants::AttendanceMarkedAt, now)
        .value(EventParticipants::AttendanceMarkedBy, marked_by)
        .value(EventParticipants::AttendanceUpdatedAt, now);
    if let Some(notes) = notes {
        update.value(EventParticipants::AttendanceNotes, notes);
    }
    update
        .and_where(Expr::col(EventParticipants::ParticipantId).eq(participant_id))
        .build(SqliteQueryBuilder)
}

/// Next batch of registered participants with unresolved attendance,
/// strictly after `after_participant_id`.
pub fn unknown_batch(event_id: i64, after_participant_id: i64, limit: u64) -> Built {
    Query::select()
        .columns([
            EventParticipants::ParticipantId,
            EventParticipants::UserId,
        ])
        .from(EventParticipants::Table)
        .and_where(Expr::col(EventParticipants::EventId).eq(event_id))
        .and_where(Expr::col(EventParticipants::Status).eq("registered"))
        .and_where(Expr::col(EventParticipants::AttendanceStatus).eq("unknown"))
        .and_where(Expr::col(EventParticipants::ParticipantId).gt(after_participant_id))
        .order_by(EventParticipants::ParticipantId, Order::Asc)
        .limit(limit)
        .build(SqliteQueryBuilder)
}

/// Flag one participant absent if attendance is still unresolved.
pub fn mark_absent(participant_id: i64, now: &str) -> Built {
    Query::update()
        .table(EventParticipants::Table)
        .value(EventParticipants::AttendanceStatus, "absent")
        .value(EventParticipants::AttendanceMarkedAt, now)
        .value(EventParticipants::AttendanceMarkedBy, Option::<i64>::None)
        .value(EventParticipants::AttendanceUpdatedAt, now)
        .and_where(Expr::col(EventParticipants::ParticipantId).eq(participant_id))
        .and_where(Expr::col(EventParticipants::AttendanceStatus).eq("unknown"))
        .build(SqliteQueryBuilder)
}

/// Registered participants checked in by a person, ready to become `attended`.
pub fn finalize_candidates(event_id: i64) -> Built {
    base_select()
        .and_where(Expr::col(EventParticipants::EventId).eq(event_id))
        .and_where(Expr::col(EventParticipants::Status).eq("registered"))
        .and_where(Expr::col(EventParticipants::AttendanceStatus).is_in(["present", "late"]))
        .and_where(Expr::col(EventParticipants::AttendanceMarkedBy).is_not_null())
        .order_by(EventParticipants::ParticipantId, Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Move a participant between participation statuses.
pub fn transition_status(participant_id: i64, from: &str, to: &str) -> Built {
    Query::update()
        .table(EventParticipants::Table)
        .value(EventParticipants::Status, to)
        .and_where(Expr::col(EventParticipants::ParticipantId).eq(participant_id))
        .and_where(Expr::col(EventParticipants::Status).eq(from))
        .build(SqliteQueryBuilder)
}

/// Count the user's other events of `event_type` where they were present or late.
pub fn count_attended_of_type(user_id: i64, event_type: &str, exclude_event_id: i64) -> Built {
    Query::select()
        .expr(Func::count(Expr::col((
            EventParticipants::Table,
            EventParticipants::ParticipantId,
        ))))
        .from(EventParticipants::Table)
        .inner_join(
            Events::Table,
            Expr::col((Events::Table, Events::EventId))
                .equals((EventParticipants::Table, EventParticipants::EventId)),
        )
        .and_where(Expr::col((EventParticipants::Table, EventParticipants::UserId)).eq(user_id))
        .and_where(Expr::col((Events::Table, Events::EventType)).eq(event_type))
        .and_where(Expr::col((Events::Table, Events::EventId)).ne(exclude_event_id))
        .and_where(
            Expr::col((EventParticipants::Table, EventParticipants::AttendanceStatus))
                .is_in(["present", "late"]),
        )
        .build(SqliteQueryBuilder)
}

/// Number of a user's participations in any of `statuses`.
pub fn count_by_status(user_id: i64, statuses: &[&str]) -> Built {
    Query::select()
        .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
        .from(EventParticipants::Table)
        .and_where(Expr::col(EventParticipants::UserId).eq(user_id))
        .and_where(Expr::col(EventParticipants::Status).is_in(statuses.iter().copied()))
        .build(SqliteQueryBuilder)
}

/// Number of events created by the user.
pub fn hosted_count(user_id: i64) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Events::EventId)))
        .from(Events::Table)
        .and_where(Expr::col(Events::CreatedBy).eq(user_id))
        .build(SqliteQueryBuilder)
}
