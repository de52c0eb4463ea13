//! Check-in, manual correction, audit history, and finalization.
//!
//! Every function runs against the caller's transaction. Domain events are
//! left to the caller so they fire only after commit.

use chrono::{DateTime, Utc};
use rollcall_api::db::{attendance_audit as audit_sql, participants as participant_sql};
use rollcall_api::{
    AttendanceAuditEntry, AuditAction, AuditQuery, FinalizedParticipant, ParticipantAttendance,
};
use rollcall_core::attendance::{DEFAULT_CHECKIN_WINDOW_MINS, DEFAULT_GRACE_MINS};
use rollcall_core::{AttendanceStatus, EventTiming, ParticipationStatus, WindowOutcome};
use rusqlite::{Connection, Row};

use crate::error::{Result, StoreError};
use crate::events;
use crate::sql::{self, fmt_ts, ts_col};

pub const MAX_AUDIT_LIMIT: u32 = 500;

/// Window sizes used when an event leaves them unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDefaults {
    pub checkin_window_mins: i64,
    pub grace_mins: i64,
}

impl Default for WindowDefaults {
    fn default() -> Self {
        Self {
            checkin_window_mins: DEFAULT_CHECKIN_WINDOW_MINS,
            grace_mins: DEFAULT_GRACE_MINS,
        }
    }
}

/// Result of a check-in. `recorded` is false when the participant was
/// already present and nothing was written.
#[derive(Debug, Clone)]
pub struct CheckIn {
    pub record: ParticipantAttendance,
    pub recorded: bool,
}

#[derive(Debug, Clone)]
pub struct Correction {
    pub record: ParticipantAttendance,
    pub previous: AttendanceStatus,
    pub changed: bool,
}

struct AuditRow<'a> {
    participant: &'a ParticipantAttendance,
    marked_by: Option<i64>,
    action: AuditAction,
    previous_status: Option<&'a str>,
    new_status: &'a str,
    reason: Option<&'a str>,
    dedupe_key: Option<&'a str>,
}

fn append_audit(conn: &Connection, row: AuditRow<'_>, now: DateTime<Utc>) -> Result<usize> {
    let performed_at = fmt_ts(now);
    Ok(sql::execute(
        conn,
        audit_sql::insert(&audit_sql::NewAuditEntry {
            event_id: row.participant.event_id,
            participant_id: row.participant.participant_id,
            user_id: row.participant.user_id,
            marked_by: row.marked_by,
            action: row.action.as_str(),
            previous_status: row.previous_status,
            new_status: row.new_status,
            reason: row.reason,
            dedupe_key: row.dedupe_key,
            performed_at: &performed_at,
        }),
    )?)
}

// ─── Check-in ───────────────────────────────────────────────────────────────

/// Record a check-in at `now`, classifying it against the event's window.
pub fn check_in(
    conn: &Connection,
    event_id: i64,
    participant_id: i64,
    marked_by: Option<i64>,
    now: DateTime<Utc>,
    defaults: WindowDefaults,
) -> Result<CheckIn> {
    let event = events::require(conn, event_id)?;
    if !event.status.is_checkin_actionable() {
        return Err(StoreError::invalid_state(format!(
            "Cannot check in: Event is {}",
            event.status
        )));
    }

    let timing = EventTiming::with_defaults(
        event.start_at,
        event.checkin_window_mins,
        event.grace_mins,
        defaults.checkin_window_mins,
        defaults.grace_mins,
    );
    let outcome = timing.classify(now)?;
    let Some(status) = outcome.attendance_status() else {
        return Err(StoreError::WindowNotOpen(
            "Event check-in is not yet available".to_string(),
        ));
    };

    let participant = events::require_participant(conn, event_id, participant_id)?;
    if participant.participation_status != ParticipationStatus::Registered {
        return Err(StoreError::invalid_state(
            "Only registered participants may be checked in",
        ));
    }
    if participant.attendance_status == AttendanceStatus::Present {
        tracing::debug!(event_id, participant_id, "Already checked in");
        return Ok(CheckIn {
            record: participant,
            recorded: false,
        });
    }

    sql::execute(
        conn,
        participant_sql::set_attendance(
            participant_id,
            status.as_str(),
            marked_by,
            None,
            &fmt_ts(now),
        ),
    )?;
    append_audit(
        conn,
        AuditRow {
            participant: &participant,
            marked_by,
            action: AuditAction::CheckIn,
            previous_status: Some(participant.attendance_status.as_str()),
            new_status: status.as_str(),
            reason: (outcome == WindowOutcome::Late).then_some("late"),
            dedupe_key: None,
        },
        now,
    )?;

    Ok(CheckIn {
        record: events::require_participant(conn, event_id, participant_id)?,
        recorded: true,
    })
}

// ─── Correction ─────────────────────────────────────────────────────────────

/// Manually set a participant's attendance. No window or lifecycle checks.
pub fn patch_attendance(
    conn: &Connection,
    event_id: i64,
    participant_id: i64,
    new_status: &str,
    marked_by: Option<i64>,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Correction> {
    let status: AttendanceStatus = new_status
        .trim()
        .parse()
        .map_err(|_| StoreError::validation("Invalid attendance status"))?;
    events::require(conn, event_id)?;
    let participant = events::require_participant(conn, event_id, participant_id)?;
    let previous = participant.attendance_status;
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    let changed = previous != status;

    if changed {
        let notes = reason.map(|r| match participant.notes.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{existing}\nCorrection: {r}"),
            _ => format!("Correction: {r}"),
        });
        sql::execute(
            conn,
            participant_sql::set_attendance(
                participant_id,
                status.as_str(),
                marked_by,
                notes.as_deref(),
                &fmt_ts(now),
            ),
        )?;
    }
    append_audit(
        conn,
        AuditRow {
            participant: &participant,
            marked_by,
            action: AuditAction::Correction,
            previous_status: Some(previous.as_str()),
            new_status: status.as_str(),
            reason,
            dedupe_key: None,
        },
        now,
    )?;

    Ok(Correction {
        record: events::require_participant(conn, event_id, participant_id)?,
        previous,
        changed,
    })
}

// ─── Audit history ──────────────────────────────────────────────────────────

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceAuditEntry> {
    let action: String = row.get("action")?;
    let action = AuditAction::parse(&action).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown audit action '{action}'").into(),
        )
    })?;
    Ok(AttendanceAuditEntry {
        audit_id: row.get("audit_id")?,
        event_id: row.get("event_id")?,
        participant_id: row.get("participant_id")?,
        user_id: row.get("user_id")?,
        marked_by: row.get("marked_by")?,
        action,
        previous_status: row.get("previous_status")?,
        new_status: row.get("new_status")?,
        reason: row.get("reason")?,
        performed_at: ts_col(row, "performed_at")?,
    })
}

/// Audit rows for an event, newest first.
pub fn get_attendance_audit(
    conn: &Connection,
    event_id: i64,
    query: &AuditQuery,
    default_limit: u32,
) -> Result<Vec<AttendanceAuditEntry>> {
    events::require(conn, event_id)?;
    let limit = query.limit.unwrap_or(default_limit).clamp(1, MAX_AUDIT_LIMIT);
    let before = query.before.map(fmt_ts);
    Ok(sql::query_all(
        conn,
        audit_sql::list(
            event_id,
            query.participant_id,
            before.as_deref(),
            u64::from(limit),
        ),
        audit_from_row,
    )?)
}

// ─── Finalization ───────────────────────────────────────────────────────────

/// Promote registered participants whose presence was recorded by someone
/// to `attended`. Safe to repeat: promoted rows no longer match.
pub fn finalize_attended_participants(
    conn: &Connection,
    event_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<FinalizedParticipant>> {
    events::require(conn, event_id)?;
    let candidates = sql::query_all(
        conn,
        participant_sql::finalize_candidates(event_id),
        events::participant_from_row,
    )?;

    let mut finalized = Vec::with_capacity(candidates.len());
    for participant in &candidates {
        let moved = sql::execute(
            conn,
            participant_sql::transition_status(
                participant.participant_id,
                ParticipationStatus::Registered.as_str(),
                ParticipationStatus::Attended.as_str(),
            ),
        )?;
        if moved == 0 {
            continue;
        }
        let dedupe_key = format!("finalize:{}", participant.participant_id);
        append_audit(
            conn,
            AuditRow {
                participant,
                marked_by: participant.marked_by,
                action: AuditAction::FinalizeAttended,
                previous_status: Some(ParticipationStatus::Registered.as_str()),
                new_status: ParticipationStatus::Attended.as_str(),
                reason: None,
                dedupe_key: Some(&dedupe_key),
            },
            now,
        )?;
        finalized.push(FinalizedParticipant {
            participant_id: participant.participant_id,
            user_id: participant.user_id,
        });
    }

    if !finalized.is_empty() {
        tracing::info!(event_id, count = finalized.len(), "Finalized attendance");
    }
    Ok(finalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_event, test_db};
    use rollcall_core::EventStatus;
    use rollcall_core::testing::minutes_from_start;

    const STAFF: Option<i64> = Some(99);

    fn seeded(db: &crate::Db, status: EventStatus) -> (i64, i64) {
        db.with_tx(|tx| {
            let mut request = sample_event("evt");
            request.status = status;
            let event = events::insert(tx, &request)?;
            let p = events::register(
                tx,
                event.event_id,
                Some(7),
                ParticipationStatus::Registered,
                minutes_from_start(-600),
            )?;
            Ok((event.event_id, p.participant_id))
        })
        .unwrap()
    }

    fn check_in_at(db: &crate::Db, ids: (i64, i64), mins: i64) -> Result<CheckIn> {
        db.with_tx(|tx| {
            check_in(
                tx,
                ids.0,
                ids.1,
                STAFF,
                minutes_from_start(mins),
                WindowDefaults::default(),
            )
        })
    }

    #[test]
    fn window_boundaries() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);

        let err = check_in_at(&db, ids, -16).unwrap_err();
        assert!(matches!(err, StoreError::WindowNotOpen(_)));
        assert_eq!(err.to_string(), "Event check-in is not yet available");

        let first = check_in_at(&db, ids, -15).unwrap();
        assert!(first.recorded);
        assert_eq!(first.record.attendance_status, AttendanceStatus::Present);
        assert_eq!(first.record.marked_by, STAFF);
        assert_eq!(first.record.marked_at, Some(minutes_from_start(-15)));
    }

    #[test]
    fn oversized_default_window_is_a_validation_error() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);
        let defaults = WindowDefaults {
            checkin_window_mins: i64::MAX,
            ..WindowDefaults::default()
        };
        let err = db
            .with_tx(|tx| check_in(tx, ids.0, ids.1, STAFF, minutes_from_start(0), defaults))
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        // The connection is still usable afterwards.
        let ok = check_in_at(&db, ids, 0).unwrap();
        assert_eq!(ok.record.attendance_status, AttendanceStatus::Present);
    }

    #[test]
    fn late_after_grace_deadline() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Ongoing);
        let at_deadline = check_in_at(&db, ids, 10).unwrap();
        assert_eq!(at_deadline.record.attendance_status, AttendanceStatus::Present);

        let db = test_db();
        let ids = seeded(&db, EventStatus::Ongoing);
        let late = check_in_at(&db, ids, 11).unwrap();
        assert_eq!(late.record.attendance_status, AttendanceStatus::Late);
    }

    #[test]
    fn no_upper_bound_on_check_in() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Ongoing);
        let much_later = check_in_at(&db, ids, 60 * 24).unwrap();
        assert_eq!(much_later.record.attendance_status, AttendanceStatus::Late);
    }

    #[test]
    fn repeat_check_in_is_a_no_op() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);
        assert!(check_in_at(&db, ids, 0).unwrap().recorded);
        let again = check_in_at(&db, ids, 5).unwrap();
        assert!(!again.recorded);
        assert_eq!(again.record.marked_at, Some(minutes_from_start(0)));

        let audit = db
            .with_conn(|conn| get_attendance_audit(conn, ids.0, &AuditQuery::default(), 100))
            .unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::CheckIn);
    }

    #[test]
    fn rejects_non_actionable_events() {
        for status in [EventStatus::Draft, EventStatus::Completed, EventStatus::Cancelled] {
            let db = test_db();
            let ids = seeded(&db, status);
            let err = check_in_at(&db, ids, 0).unwrap_err();
            assert_eq!(err.to_string(), format!("Cannot check in: Event is {status}"));
        }
    }

    #[test]
    fn missing_rows_are_not_found() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);
        let err = check_in_at(&db, (ids.0 + 50, ids.1), 0).unwrap_err();
        assert_eq!(err.to_string(), "Event not found");
        let err = check_in_at(&db, (ids.0, ids.1 + 50), 0).unwrap_err();
        assert_eq!(err.to_string(), "Participant not found");
    }

    #[test]
    fn waitlisted_participants_cannot_check_in() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);
        let waitlisted = db
            .with_tx(|tx| {
                events::register(tx, ids.0, Some(8), ParticipationStatus::Waitlisted, minutes_from_start(-60))
            })
            .unwrap();
        let err = check_in_at(&db, (ids.0, waitlisted.participant_id), 0).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
    }

    #[test]
    fn patch_bypasses_window_and_lifecycle() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Completed);
        let corrected = db
            .with_tx(|tx| {
                patch_attendance(tx, ids.0, ids.1, "late", STAFF, Some("badge scanner down"), minutes_from_start(-500))
            })
            .unwrap();
        assert!(corrected.changed);
        assert_eq!(corrected.previous, AttendanceStatus::Unknown);
        assert_eq!(corrected.record.attendance_status, AttendanceStatus::Late);
        assert_eq!(corrected.record.notes.as_deref(), Some("Correction: badge scanner down"));

        let again = db
            .with_tx(|tx| {
                patch_attendance(tx, ids.0, ids.1, "absent", STAFF, Some("left early"), minutes_from_start(-400))
            })
            .unwrap();
        assert_eq!(
            again.record.notes.as_deref(),
            Some("Correction: badge scanner down\nCorrection: left early")
        );
    }

    #[test]
    fn patch_rejects_unknown_status() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);
        let err = db
            .with_tx(|tx| patch_attendance(tx, ids.0, ids.1, "teleported", STAFF, None, minutes_from_start(0)))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid attendance status");
    }

    #[test]
    fn unchanged_patch_still_audits() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);
        let unchanged = db
            .with_tx(|tx| patch_attendance(tx, ids.0, ids.1, "unknown", STAFF, Some("double check"), minutes_from_start(0)))
            .unwrap();
        assert!(!unchanged.changed);
        assert!(unchanged.record.notes.is_none());
        let audit = db
            .with_conn(|conn| get_attendance_audit(conn, ids.0, &AuditQuery::default(), 100))
            .unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Correction);
        assert_eq!(audit[0].reason.as_deref(), Some("double check"));
    }

    #[test]
    fn audit_is_newest_first_and_filterable() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);
        check_in_at(&db, ids, 0).unwrap();
        db.with_tx(|tx| patch_attendance(tx, ids.0, ids.1, "late", STAFF, Some("clock skew"), minutes_from_start(30)))
            .unwrap();

        let all = db
            .with_conn(|conn| get_attendance_audit(conn, ids.0, &AuditQuery::default(), 100))
            .unwrap();
        assert_eq!(
            all.iter().map(|a| a.action).collect::<Vec<_>>(),
            vec![AuditAction::Correction, AuditAction::CheckIn]
        );

        let limited = AuditQuery {
            limit: Some(0),
            ..AuditQuery::default()
        };
        let one = db
            .with_conn(|conn| get_attendance_audit(conn, ids.0, &limited, 100))
            .unwrap();
        assert_eq!(one.len(), 1);

        let before = AuditQuery {
            before: Some(minutes_from_start(30)),
            ..AuditQuery::default()
        };
        let older = db
            .with_conn(|conn| get_attendance_audit(conn, ids.0, &before, 100))
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].action, AuditAction::CheckIn);

        let other = AuditQuery {
            participant_id: Some(ids.1 + 1),
            ..AuditQuery::default()
        };
        assert!(
            db.with_conn(|conn| get_attendance_audit(conn, ids.0, &other, 100))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn finalize_promotes_marked_participants_once() {
        let db = test_db();
        let ids = seeded(&db, EventStatus::Published);
        check_in_at(&db, ids, 0).unwrap();
        let unmarked = db
            .with_tx(|tx| {
                let p = events::register(tx, ids.0, Some(8), ParticipationStatus::Registered, minutes_from_start(-60))?;
                // Present without a marker does not count.
                tx.execute(
                    "UPDATE event_participants SET attendance_status = 'present' WHERE participant_id = ?1",
                    [p.participant_id],
                )?;
                Ok(p.participant_id)
            })
            .unwrap();

        let finalized = db
            .with_tx(|tx| finalize_attended_participants(tx, ids.0, minutes_from_start(130)))
            .unwrap();
        assert_eq!(
            finalized,
            vec![FinalizedParticipant {
                participant_id: ids.1,
                user_id: Some(7),
            }]
        );
        let again = db
            .with_tx(|tx| finalize_attended_participants(tx, ids.0, minutes_from_start(131)))
            .unwrap();
        assert!(again.is_empty());

        let rows = db.with_conn(|conn| events::participants(conn, ids.0)).unwrap();
        let status_of = |pid: i64| {
            rows.iter()
                .find(|p| p.participant_id == pid)
                .map(|p| p.participation_status)
        };
        assert_eq!(status_of(ids.1), Some(ParticipationStatus::Attended));
        assert_eq!(status_of(unmarked), Some(ParticipationStatus::Registered));
    }
}
