//! Event and participant reads, plus the seeding writes the CLI exposes.

use chrono::{DateTime, Utc};
use rollcall_api::db::{events as event_sql, participants as participant_sql};
use rollcall_api::{EventInfo, NewEventRequest, ParticipantAttendance};
use rollcall_core::{EventStatus, ParticipationStatus, validate_window_mins};
use rusqlite::{Connection, Row};

use crate::error::{Result, StoreError};
use crate::sql::{self, fmt_ts, opt_ts_col, parsed_col, ts_col};

// ─── Row mappers ────────────────────────────────────────────────────────────

pub(crate) fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventInfo> {
    Ok(EventInfo {
        event_id: row.get("event_id")?,
        uid: row.get("uid")?,
        title: row.get("title")?,
        event_type: row.get("event_type")?,
        status: parsed_col(row, "status")?,
        start_at: ts_col(row, "start_at")?,
        end_at: ts_col(row, "end_at")?,
        checkin_window_mins: row.get("checkin_window_mins")?,
        grace_mins: row.get("grace_mins")?,
        created_by: row.get("created_by")?,
    })
}

pub(crate) fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<ParticipantAttendance> {
    Ok(ParticipantAttendance {
        participant_id: row.get("participant_id")?,
        event_id: row.get("event_id")?,
        user_id: row.get("user_id")?,
        participation_status: parsed_col(row, "status")?,
        attendance_status: parsed_col(row, "attendance_status")?,
        marked_at: opt_ts_col(row, "attendance_marked_at")?,
        marked_by: row.get("attendance_marked_by")?,
        notes: row.get("attendance_notes")?,
        updated_at: opt_ts_col(row, "attendance_updated_at")?,
    })
}

// ─── Events ─────────────────────────────────────────────────────────────────

pub fn get(conn: &Connection, event_id: i64) -> Result<Option<EventInfo>> {
    Ok(sql::query_opt(conn, event_sql::get(event_id), event_from_row)?)
}

/// Like [`get`], but a missing event is an error.
pub fn require(conn: &Connection, event_id: i64) -> Result<EventInfo> {
    get(conn, event_id)?.ok_or_else(|| StoreError::not_found("Event not found"))
}

pub fn get_by_uid(conn: &Connection, uid: &str) -> Result<Option<EventInfo>> {
    Ok(sql::query_opt(conn, event_sql::get_by_uid(uid), event_from_row)?)
}

pub fn insert(conn: &Connection, request: &NewEventRequest) -> Result<EventInfo> {
    if request.uid.trim().is_empty() {
        return Err(StoreError::validation("Event uid must not be empty"));
    }
    if request.end_at < request.start_at {
        return Err(StoreError::validation("Event must not end before it starts"));
    }
    if let Some(mins) = request.checkin_window_mins {
        validate_window_mins("checkin_window_mins", mins)?;
    }
    if let Some(mins) = request.grace_mins {
        validate_window_mins("grace_mins", mins)?;
    }
    let start_at = fmt_ts(request.start_at);
    let end_at = fmt_ts(request.end_at);
    sql::execute(
        conn,
        event_sql::insert(&event_sql::NewEvent {
            uid: &request.uid,
            title: &request.title,
            event_type: request.event_type.as_deref(),
            status: request.status.as_str(),
            start_at: &start_at,
            end_at: &end_at,
            checkin_window_mins: request.checkin_window_mins,
            grace_mins: request.grace_mins,
            created_by: request.created_by,
        }),
    )?;
    require(conn, conn.last_insert_rowid())
}

/// Published events whose start has passed.
pub fn due_to_start(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<EventInfo>> {
    Ok(sql::query_all(
        conn,
        event_sql::due_to_start(&fmt_ts(now)),
        event_from_row,
    )?)
}

/// Running events whose end has passed.
pub fn due_to_complete(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<EventInfo>> {
    Ok(sql::query_all(
        conn,
        event_sql::due_to_complete(&fmt_ts(now)),
        event_from_row,
    )?)
}

/// Move an event to `to` if it is currently in one of `from`.
/// Returns false when another writer got there first.
pub fn transition_status(
    conn: &Connection,
    event_id: i64,
    from: &[EventStatus],
    to: EventStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let from: Vec<&str> = from.iter().map(EventStatus::as_str).collect();
    let changed = sql::execute(
        conn,
        event_sql::transition_status(event_id, &from, to.as_str(), &fmt_ts(now)),
    )?;
    Ok(changed > 0)
}

// ─── Participants ───────────────────────────────────────────────────────────

/// Register a user (or an anonymous guest) for an event.
pub fn register(
    conn: &Connection,
    event_id: i64,
    user_id: Option<i64>,
    status: ParticipationStatus,
    now: DateTime<Utc>,
) -> Result<ParticipantAttendance> {
    require(conn, event_id)?;
    sql::execute(
        conn,
        participant_sql::insert(event_id, user_id, status.as_str(), &fmt_ts(now)),
    )?;
    require_participant(conn, event_id, conn.last_insert_rowid())
}

pub fn participant(
    conn: &Connection,
    event_id: i64,
    participant_id: i64,
) -> Result<Option<ParticipantAttendance>> {
    Ok(sql::query_opt(
        conn,
        participant_sql::get(event_id, participant_id),
        participant_from_row,
    )?)
}

pub fn require_participant(
    conn: &Connection,
    event_id: i64,
    participant_id: i64,
) -> Result<ParticipantAttendance> {
    participant(conn, event_id, participant_id)?
        .ok_or_else(|| StoreError::not_found("Participant not found"))
}

pub fn participants(conn: &Connection, event_id: i64) -> Result<Vec<ParticipantAttendance>> {
    Ok(sql::query_all(
        conn,
        participant_sql::list_for_event(event_id),
        participant_from_row,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_event, test_db};
    use rollcall_core::testing::{event_start, minutes_from_start};

    #[test]
    fn insert_and_lookup_by_uid() {
        let db = test_db();
        db.with_tx(|tx| {
            let created = insert(tx, &sample_event("evt-1"))?;
            assert_eq!(created.status, EventStatus::Published);
            assert_eq!(created.start_at, event_start());
            let found = get_by_uid(tx, "evt-1")?.unwrap();
            assert_eq!(found.event_id, created.event_id);
            assert!(get(tx, created.event_id + 100)?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn rejects_event_ending_before_start() {
        let db = test_db();
        let mut request = sample_event("evt-bad");
        request.end_at = minutes_from_start(-1);
        let err = db.with_tx(|tx| insert(tx, &request)).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn rejects_window_longer_than_a_week() {
        let db = test_db();
        let mut request = sample_event("evt-wide");
        request.checkin_window_mins = Some(i64::MAX);
        let err = db.with_tx(|tx| insert(tx, &request)).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("checkin_window_mins"));

        request.checkin_window_mins = Some(rollcall_core::MAX_WINDOW_MINS);
        request.grace_mins = Some(-1);
        let err = db.with_tx(|tx| insert(tx, &request)).unwrap_err();
        assert!(err.to_string().contains("grace_mins"));
    }

    #[test]
    fn registration_starts_with_unknown_attendance() {
        let db = test_db();
        db.with_tx(|tx| {
            let event = insert(tx, &sample_event("evt-2"))?;
            let p = register(tx, event.event_id, Some(7), ParticipationStatus::Registered, event_start())?;
            assert_eq!(p.user_id, Some(7));
            assert_eq!(p.attendance_status, rollcall_core::AttendanceStatus::Unknown);
            assert!(p.marked_at.is_none());
            assert_eq!(participants(tx, event.event_id)?.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn register_for_missing_event_is_not_found() {
        let db = test_db();
        let err = db
            .with_tx(|tx| register(tx, 404, Some(1), ParticipationStatus::Registered, event_start()))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn transition_is_guarded_by_current_status() {
        let db = test_db();
        db.with_tx(|tx| {
            let event = insert(tx, &sample_event("evt-3"))?;
            let now = minutes_from_start(1);
            assert_eq!(due_to_start(tx, now)?.len(), 1);
            assert!(transition_status(tx, event.event_id, &[EventStatus::Published], EventStatus::Ongoing, now)?);
            assert!(!transition_status(tx, event.event_id, &[EventStatus::Published], EventStatus::Ongoing, now)?);
            assert!(due_to_start(tx, now)?.is_empty());
            assert_eq!(due_to_complete(tx, minutes_from_start(120))?.len(), 1);
            Ok(())
        })
        .unwrap();
    }
}
