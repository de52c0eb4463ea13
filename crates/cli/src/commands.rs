use anyhow::{Context, Result};
use rollcall_api::{
    Actor, AuditQuery, AwardRequest, LeaderboardPeriod, NewAchievementMapping, NewEventRequest,
};
use rollcall_core::{GamificationAction, ParticipationStatus};
use rollcall_store::Engine;

use crate::output::emit;

pub fn add_event(engine: &Engine, actor: &Actor, request: NewEventRequest) -> Result<()> {
    let event = engine.create_event(actor, &request)?;
    emit("event", format!("Created event {}", event.event_id), &event)
}

pub fn show_event(engine: &Engine, event_id: i64) -> Result<()> {
    let event = engine.event(event_id)?;
    let participants = engine.participants(event_id)?;
    emit(
        "event",
        format!("Event {} is {}", event.uid, event.status),
        &serde_json::json!({ "event": event, "participants": participants }),
    )
}

pub fn register(
    engine: &Engine,
    actor: &Actor,
    event_id: i64,
    user_id: i64,
    status: ParticipationStatus,
) -> Result<()> {
    let participant = engine.register(actor, event_id, Some(user_id), status)?;
    emit(
        "participant",
        format!("Registered participant {}", participant.participant_id),
        &participant,
    )
}

pub fn check_in(engine: &Engine, actor: &Actor, event_id: i64, participant_id: i64) -> Result<()> {
    let record = engine.check_in(actor, event_id, participant_id)?;
    emit(
        "participant",
        format!("Participant {participant_id} is {}", record.attendance_status),
        &record,
    )
}

pub fn patch(
    engine: &Engine,
    actor: &Actor,
    event_id: i64,
    participant_id: i64,
    status: &str,
    reason: Option<&str>,
) -> Result<()> {
    let record = engine.patch_attendance(actor, event_id, participant_id, status, reason)?;
    emit(
        "participant",
        format!("Participant {participant_id} set to {}", record.attendance_status),
        &record,
    )
}

pub fn flag_absences(engine: &Engine, actor: &Actor, event_id: i64) -> Result<()> {
    let sweep = engine.auto_flag_absences(actor, event_id)?;
    emit(
        "absence_sweep",
        format!("Flagged {} of {} participants", sweep.flagged, sweep.scanned),
        &sweep,
    )
}

pub fn finalize(engine: &Engine, actor: &Actor, event_id: i64) -> Result<()> {
    let finalized = engine.finalize_attended_participants(actor, event_id)?;
    emit(
        "finalized",
        format!("Finalized {} participants", finalized.len()),
        &finalized,
    )
}

pub fn audit(engine: &Engine, actor: &Actor, event_id: i64, query: AuditQuery) -> Result<()> {
    let entries = engine.get_attendance_audit(actor, event_id, &query)?;
    emit("audit", format!("{} audit entries", entries.len()), &entries)
}

pub struct AwardArgs {
    pub user_id: i64,
    pub action: GamificationAction,
    pub event: Option<i64>,
    pub suffix: Option<String>,
    pub points: Option<i64>,
    pub metadata: Option<String>,
}

impl AwardArgs {
    fn into_request(self) -> Result<AwardRequest> {
        let mut request = AwardRequest::new(self.user_id, self.action);
        if let Some(event_id) = self.event {
            request = request.event(event_id);
        }
        if let Some(suffix) = self.suffix {
            request = request.suffix(suffix);
        }
        if let Some(points) = self.points {
            request = request.points(points);
        }
        if let Some(raw) = self.metadata {
            let metadata: serde_json::Value =
                serde_json::from_str(&raw).context("--metadata must be valid JSON")?;
            request = request.metadata(metadata);
        }
        Ok(request)
    }
}

pub fn award(engine: &Engine, actor: &Actor, args: AwardArgs) -> Result<()> {
    let request = args.into_request()?;
    let outcome = engine.award_action(actor, &request)?;
    let message = if outcome.skipped {
        format!("Skipped duplicate {}", outcome.dedupe_key)
    } else {
        format!("Awarded {} points", outcome.points_delta)
    };
    emit("award", message, &outcome)
}

pub fn ocr_approve(engine: &Engine, actor: &Actor, user_id: i64, submission_id: &str) -> Result<()> {
    let change = engine.record_ocr_approval(actor, user_id, submission_id)?;
    emit("achievement_progress", "Recorded OCR approval", &change)
}

pub fn summary(engine: &Engine, actor: &Actor, user_id: i64) -> Result<()> {
    let summary = engine.summary(actor, user_id)?;
    emit(
        "summary",
        format!(
            "User {user_id} has {} points at level {}",
            summary.stats.total_points, summary.level.level
        ),
        &summary,
    )
}

pub fn achievements(engine: &Engine, actor: &Actor, user_id: i64) -> Result<()> {
    let view = engine.user_achievements(actor, user_id)?;
    emit(
        "achievements",
        format!("{} badges earned", view.earned.len()),
        &view,
    )
}

pub fn leaderboard(
    engine: &Engine,
    actor: &Actor,
    period: LeaderboardPeriod,
    limit: u32,
) -> Result<()> {
    let entries = engine.leaderboard(actor, period, limit)?;
    emit("leaderboard", format!("{} entries", entries.len()), &entries)
}

pub fn add_mapping(engine: &Engine, actor: &Actor, request: NewAchievementMapping) -> Result<()> {
    let mapping = engine.create_achievement_mapping(actor, &request)?;
    emit(
        "achievement_mapping",
        format!("Mapped {} as mapping {}", mapping.badge_code, mapping.mapping_id),
        &mapping,
    )
}

pub fn list_mappings(engine: &Engine, actor: &Actor, active_only: bool) -> Result<()> {
    let mappings = engine.achievement_mappings(actor, active_only)?;
    emit("achievement_mappings", format!("{} mappings", mappings.len()), &mappings)
}

pub fn set_mapping_active(engine: &Engine, actor: &Actor, mapping_id: i64, active: bool) -> Result<()> {
    let mapping = engine.set_achievement_mapping_active(actor, mapping_id, active)?;
    let state = if mapping.is_active { "enabled" } else { "disabled" };
    emit(
        "achievement_mapping",
        format!("Mapping {mapping_id} {state}"),
        &mapping,
    )
}

pub fn levels(engine: &Engine, actor: &Actor) -> Result<()> {
    let levels = engine.level_thresholds(actor)?;
    emit("levels", format!("{} levels", levels.len()), &levels)
}

pub fn recalc(engine: &Engine, actor: &Actor, user_id: i64) -> Result<()> {
    let stats = engine.recalculate_user(actor, user_id)?;
    emit(
        "stats",
        format!("Recalculated user {user_id}: {} points", stats.total_points),
        &stats,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(metadata: Option<&str>) -> AwardArgs {
        AwardArgs {
            user_id: 7,
            action: GamificationAction::EventAttend,
            event: Some(3),
            suffix: Some("attendance-7".into()),
            points: None,
            metadata: metadata.map(str::to_string),
        }
    }

    #[test]
    fn award_args_build_request() {
        let request = args(Some(r#"{"source":"kiosk"}"#)).into_request().unwrap();
        assert_eq!(request.event_id, Some(3));
        assert_eq!(request.dedupe_suffix.as_deref(), Some("attendance-7"));
        assert_eq!(request.metadata.unwrap()["source"], "kiosk");
    }

    #[test]
    fn bad_metadata_is_rejected() {
        let err = args(Some("{not json")).into_request().unwrap_err();
        assert!(err.to_string().contains("--metadata"));
    }
}
