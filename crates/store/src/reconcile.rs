//! Sweep unresolved attendance to `absent` once an event is over.

use chrono::{DateTime, Utc};
use rollcall_api::db::{attendance_audit as audit_sql, participants as participant_sql};
use rollcall_api::{AbsenceSweep, AuditAction, BatchSummary};
use rollcall_core::AttendanceStatus;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::Db;
use crate::error::Result;
use crate::events;
use crate::sql::{self, fmt_ts};

pub const AUTO_ABSENT_REASON: &str = "auto-absent";

/// Flag every registered participant still in `unknown` attendance as absent.
/// The event's lifecycle status is not checked; callers decide when to sweep.
///
/// Each batch commits on its own, so a long sweep never holds the write lock
/// for the whole event and an interrupted sweep resumes where it stopped.
pub fn auto_flag_absences(
    db: &Db,
    event_id: i64,
    now: DateTime<Utc>,
    batch_size: u32,
) -> Result<AbsenceSweep> {
    db.with_conn(|conn| events::require(conn, event_id))?;

    let batch_size = batch_size.max(1);
    let mut sweep = AbsenceSweep::default();
    let mut cursor = 0;
    while let Some((batch, last_id)) =
        db.with_tx(|tx| flag_batch(tx, event_id, cursor, batch_size, now))?
    {
        debug!(
            event_id,
            scanned = batch.scanned,
            flagged = batch.flagged,
            "Absence batch committed"
        );
        sweep.record(batch);
        cursor = last_id;
    }

    if sweep.flagged > 0 {
        info!(event_id, flagged = sweep.flagged, "Flagged absences");
    }
    Ok(sweep)
}

/// One batch past `cursor`. `None` once nothing is left to scan.
fn flag_batch(
    conn: &Connection,
    event_id: i64,
    cursor: i64,
    batch_size: u32,
    now: DateTime<Utc>,
) -> Result<Option<(BatchSummary, i64)>> {
    let rows: Vec<(i64, Option<i64>)> = sql::query_all(
        conn,
        participant_sql::unknown_batch(event_id, cursor, u64::from(batch_size)),
        |row| Ok((row.get("participant_id")?, row.get("user_id")?)),
    )?;
    let Some(&(last_id, _)) = rows.last() else {
        return Ok(None);
    };

    let stamp = fmt_ts(now);
    let mut batch = BatchSummary {
        scanned: rows.len() as u64,
        flagged: 0,
    };
    for &(participant_id, user_id) in &rows {
        let updated = sql::execute(conn, participant_sql::mark_absent(participant_id, &stamp))?;
        if updated == 0 {
            continue;
        }
        batch.flagged += 1;
        sql::execute(
            conn,
            audit_sql::insert(&audit_sql::NewAuditEntry {
                event_id,
                participant_id,
                user_id,
                marked_by: None,
                action: AuditAction::MarkAbsent.as_str(),
                previous_status: Some(AttendanceStatus::Unknown.as_str()),
                new_status: AttendanceStatus::Absent.as_str(),
                reason: Some(AUTO_ABSENT_REASON),
                dedupe_key: None,
                performed_at: &stamp,
            }),
        )?;
    }
    Ok(Some((batch, last_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{WindowDefaults, check_in};
    use crate::error::StoreError;
    use crate::test_support::{sample_event, test_db};
    use rollcall_core::testing::minutes_from_start;
    use rollcall_core::{EventStatus, ParticipationStatus};

    fn event_with(db: &Db, status: EventStatus, participants: usize) -> (i64, Vec<i64>) {
        db.with_tx(|tx| {
            let mut request = sample_event("sweep");
            request.status = status;
            let event = events::insert(tx, &request)?;
            let mut ids = Vec::new();
            for user in 0..participants {
                let p = events::register(
                    tx,
                    event.event_id,
                    Some(100 + user as i64),
                    ParticipationStatus::Registered,
                    minutes_from_start(-600),
                )?;
                ids.push(p.participant_id);
            }
            Ok((event.event_id, ids))
        })
        .unwrap()
    }

    #[test]
    fn sweeps_unknown_then_reruns_as_no_op() {
        let db = test_db();
        let (event_id, _) = event_with(&db, EventStatus::Completed, 2);

        let first = auto_flag_absences(&db, event_id, minutes_from_start(200), 500).unwrap();
        assert_eq!(
            first,
            AbsenceSweep {
                scanned: 2,
                flagged: 2,
                batches: vec![BatchSummary {
                    scanned: 2,
                    flagged: 2
                }],
            }
        );

        let second = auto_flag_absences(&db, event_id, minutes_from_start(201), 500).unwrap();
        assert_eq!(second, AbsenceSweep::default());
    }

    #[test]
    fn batches_walk_the_cursor() {
        let db = test_db();
        let (event_id, _) = event_with(&db, EventStatus::Archived, 5);
        let sweep = auto_flag_absences(&db, event_id, minutes_from_start(200), 2).unwrap();
        assert_eq!(sweep.flagged, 5);
        assert_eq!(
            sweep.batches.iter().map(|b| b.scanned).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
    }

    #[test]
    fn resolved_participants_are_left_alone() {
        let db = test_db();
        let (event_id, ids) = event_with(&db, EventStatus::Published, 2);
        db.with_tx(|tx| {
            check_in(tx, event_id, ids[0], Some(1), minutes_from_start(0), WindowDefaults::default())?;
            events::transition_status(tx, event_id, &[EventStatus::Published], EventStatus::Completed, minutes_from_start(120))?;
            Ok(())
        })
        .unwrap();

        let sweep = auto_flag_absences(&db, event_id, minutes_from_start(200), 500).unwrap();
        assert_eq!(sweep.flagged, 1);
        let rows = db.with_conn(|conn| events::participants(conn, event_id)).unwrap();
        assert_eq!(rows[0].attendance_status, AttendanceStatus::Present);
        assert_eq!(rows[1].attendance_status, AttendanceStatus::Absent);
        assert_eq!(rows[1].marked_by, None);
    }

    #[test]
    fn sweeps_cancelled_events() {
        let db = test_db();
        let (event_id, _) = event_with(&db, EventStatus::Cancelled, 1);
        let sweep = auto_flag_absences(&db, event_id, minutes_from_start(30), 500).unwrap();
        assert_eq!((sweep.scanned, sweep.flagged), (1, 1));
    }

    #[test]
    fn missing_event_is_not_found() {
        let db = test_db();
        let err = auto_flag_absences(&db, 404, minutes_from_start(0), 500).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
