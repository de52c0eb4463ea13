//! Named-achievement progress driven by completed events and OCR approvals.

use chrono::{DateTime, Utc};
use rollcall_api::db::participants as participant_sql;
use rollcall_api::{EventInfo, ParticipantAttendance};
use rollcall_core::{AchievementCode, AttendanceStatus, DomainEvent};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::badges::{ProgressChange, ProgressSource};
use crate::error::Result;
use crate::events;
use crate::rewards::{RewardContext, award_badge_bonus};
use crate::sql;

/// Counts from one completion pass over an event's participants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub participants: usize,
    pub progress_changes: usize,
    pub promotions: usize,
    pub failures: usize,
}

/// Advance punctual_pro, early_bird, community_staple, and perfect_streak
/// for every participant of a completed event.
///
/// Each participant runs under its own savepoint; one failing participant is
/// logged and rolled back without affecting the others. Re-running for the
/// same event changes nothing.
pub fn process_event_completed(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    event_id: i64,
    job_id: &str,
    now: DateTime<Utc>,
    emitted: &mut Vec<DomainEvent>,
) -> Result<CompletionReport> {
    let mut report = CompletionReport::default();
    if !ctx.badges.enabled() {
        debug!(event_id, "Badges disabled; skipping achievement progress");
        return Ok(report);
    }
    let event = events::require(conn, event_id)?;
    let participants = events::participants(conn, event_id)?;

    for participant in &participants {
        let Some(user_id) = participant.user_id else {
            continue;
        };
        report.participants += 1;

        let mut pending = Vec::new();
        conn.execute_batch("SAVEPOINT participant_progress")?;
        match process_participant(conn, ctx, &event, participant, user_id, job_id, now, &mut pending) {
            Ok(changes) => {
                conn.execute_batch("RELEASE participant_progress")?;
                report.progress_changes += changes.len();
                report.promotions += changes.iter().filter(|c| c.promotion.is_some()).count();
                emitted.append(&mut pending);
            }
            Err(e) => {
                conn.execute_batch("ROLLBACK TO participant_progress; RELEASE participant_progress")?;
                report.failures += 1;
                warn!(
                    event_id,
                    participant_id = participant.participant_id,
                    kind = e.kind(),
                    "Achievement processing failed: {e}"
                );
            }
        }
    }
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn process_participant(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    event: &EventInfo,
    participant: &ParticipantAttendance,
    user_id: i64,
    job_id: &str,
    now: DateTime<Utc>,
    emitted: &mut Vec<DomainEvent>,
) -> Result<Vec<ProgressChange>> {
    let meta = serde_json::json!({ "participant_id": participant.participant_id });
    let source = ProgressSource {
        event_id: Some(event.event_id),
        meta: Some(&meta),
        job_id: Some(job_id),
    };
    let status = participant.attendance_status;
    let attended = status.is_attended();
    let badges = ctx.badges;
    let mut changes = Vec::new();
    let mut guarded = |code: AchievementCode, count: Option<i64>| -> Result<()> {
        if badges.audit_exists(conn, user_id, event.event_id, code)? {
            return Ok(());
        }
        let change = match count {
            Some(count) => badges.set_progress(conn, user_id, code, count, source, now)?,
            None => badges.increment_progress(conn, user_id, code, 1, source, now)?,
        };
        changes.extend(change);
        Ok(())
    };

    if status == AttendanceStatus::Present {
        guarded(AchievementCode::PunctualPro, None)?;
    }

    if attended && participant.marked_at.is_some_and(|at| at < event.start_at) {
        guarded(AchievementCode::EarlyBird, None)?;
    }

    if let (true, Some(event_type)) = (attended, event.event_type.as_deref()) {
        let earlier = sql::query_count(
            conn,
            participant_sql::count_attended_of_type(user_id, event_type, event.event_id),
        )?;
        if earlier == 0 {
            guarded(AchievementCode::CommunityStaple, None)?;
        }
    }

    match status {
        AttendanceStatus::Present => {
            let streak = crate::badges::progress(conn, user_id, AchievementCode::PerfectStreak)?
                .map_or(0, |p| p.current_count);
            guarded(AchievementCode::PerfectStreak, Some(streak + 1))?;
        }
        AttendanceStatus::Absent => guarded(AchievementCode::PerfectStreak, Some(0))?,
        AttendanceStatus::Late | AttendanceStatus::Unknown => {}
    }

    for change in &changes {
        pay_promotion(conn, ctx, user_id, change, now, emitted)?;
    }
    Ok(changes)
}

fn pay_promotion(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    user_id: i64,
    change: &ProgressChange,
    now: DateTime<Utc>,
    emitted: &mut Vec<DomainEvent>,
) -> Result<()> {
    let Some(grant) = &change.promotion else {
        return Ok(());
    };
    emitted.push(DomainEvent::BadgeUnlocked {
        user_id,
        badge_code: grant.badge_code.clone(),
        name: grant.name.clone(),
        level: grant.level,
    });
    award_badge_bonus(conn, ctx, user_id, grant, now, emitted)?;
    Ok(())
}

/// One approved OCR submission counts toward `ocr_wizard`.
pub fn record_ocr_approval(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    user_id: i64,
    submission_id: &str,
    now: DateTime<Utc>,
    emitted: &mut Vec<DomainEvent>,
) -> Result<Option<ProgressChange>> {
    let meta = serde_json::json!({ "submission_id": submission_id });
    let source = ProgressSource {
        event_id: None,
        meta: Some(&meta),
        job_id: None,
    };
    let change = ctx
        .badges
        .increment_progress(conn, user_id, AchievementCode::OcrWizard, 1, source, now)?;
    if let Some(change) = &change {
        pay_promotion(conn, ctx, user_id, change, now, emitted)?;
    }
    Ok(change)
}
