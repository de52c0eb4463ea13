//! Award orchestration: ledger entry, stats, streak, level, catalog and
//! mapped badges, and badge bonuses, all inside the caller's transaction.

use chrono::{DateTime, Utc};
use rollcall_api::{AwardOutcome, AwardRequest, GrantedBadge, LevelChange};
use rollcall_core::rules::{dedupe_key, resolve_points};
use rollcall_core::{DomainEvent, GamificationAction, LevelTable};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::badges::{BadgeEvaluator, BadgeGrant, MappingTrigger};
use crate::error::Result;
use crate::events;
use crate::ledger::{self, NewLedgerEntry};
use crate::settings::SettingsProvider;

/// Dedupe suffix for catalog badge bonuses.
pub const CATALOG_BONUS_SUFFIX: &str = "badge";

/// Everything an award needs besides the request itself.
pub struct RewardContext<'a> {
    pub settings: &'a dyn SettingsProvider,
    pub levels: &'a LevelTable,
    pub streak_window_hours: i64,
    pub badges: BadgeEvaluator,
}

/// Award `request`. Domain events are appended to `events` for the caller
/// to publish after commit.
pub fn award_action(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    request: &AwardRequest,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> Result<AwardOutcome> {
    let scope = request.event_id.map(|id| id.to_string());
    award(conn, ctx, request, scope.as_deref(), true, now, events)
}

/// Award the bonus attached to a badge grant. Catalog grants use the
/// `badge` suffix, tier promotions use the tier name.
pub fn award_badge_bonus(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    user_id: i64,
    grant: &BadgeGrant,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> Result<Option<AwardOutcome>> {
    if grant.bonus_points <= 0 {
        return Ok(None);
    }
    let suffix = match grant.level {
        Some(level) => level.as_str(),
        None => CATALOG_BONUS_SUFFIX,
    };
    let request = AwardRequest::new(user_id, GamificationAction::BadgeBonus)
        .points(grant.bonus_points)
        .suffix(suffix)
        .metadata(serde_json::json!({
            "badge_code": grant.badge_code,
            "level": grant.level,
        }));
    award(conn, ctx, &request, Some(&grant.badge_code), false, now, events).map(Some)
}

fn award(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    request: &AwardRequest,
    scope: Option<&str>,
    evaluate_badges: bool,
    now: DateTime<Utc>,
    events: &mut Vec<DomainEvent>,
) -> Result<AwardOutcome> {
    let action = request.action;
    let config = action.config();
    let key = dedupe_key(
        action,
        request.user_id,
        scope,
        request.dedupe_suffix.as_deref(),
    );
    let points = resolve_points(
        action,
        request.points_override,
        ctx.settings.action_points(action),
    );
    if points < 0 && !config.allow_negative {
        // Taken as given; the total is floored at zero when stats are applied.
        warn!(%action, points, user_id = request.user_id, "Negative points for a crediting action");
    }

    let inserted = ledger::insert_entry(
        conn,
        &NewLedgerEntry {
            user_id: request.user_id,
            event_id: request.event_id,
            action,
            points_delta: points,
            metadata: request.metadata.as_ref(),
            dedupe_key: &key,
        },
        now,
    )?;
    if !inserted {
        debug!(dedupe_key = %key, "Duplicate award skipped");
        return Ok(AwardOutcome::duplicate(key));
    }

    let mut stats = ledger::ensure_stats(conn, request.user_id, now)?;
    let level_before = stats.current_level;
    stats.apply_award(points, config.stats, now);
    if config.streak_eligible {
        stats.set_streak(stats.streak().bump(now, ctx.streak_window_hours));
    }
    stats.set_level(&ctx.levels.resolve(stats.lifetime_points));

    let grants = if evaluate_badges {
        evaluate_badges_contained(conn, ctx, request, &mut stats, now)?
    } else {
        Vec::new()
    };
    ledger::save_stats(conn, &stats, now)?;

    events.push(DomainEvent::PointsAwarded {
        user_id: request.user_id,
        action,
        event_id: request.event_id,
        points_delta: points,
    });
    if stats.current_level > level_before {
        events.push(DomainEvent::LevelUp {
            user_id: request.user_id,
            from: level_before,
            to: stats.current_level,
        });
    }

    let mut level_after = stats.current_level;
    let mut granted = Vec::with_capacity(grants.len());
    for grant in grants {
        events.push(DomainEvent::BadgeUnlocked {
            user_id: request.user_id,
            badge_code: grant.badge_code.clone(),
            name: grant.name.clone(),
            level: grant.level,
        });
        if let Some(bonus) = award_badge_bonus(conn, ctx, request.user_id, &grant, now, events)? {
            if let Some(change) = bonus.level_up {
                level_after = level_after.max(change.to);
            }
        }
        granted.push(GrantedBadge {
            achievement_id: grant.achievement_id,
            badge_code: grant.badge_code,
            name: grant.name,
            level: grant.level,
            bonus_points: grant.bonus_points,
        });
    }

    Ok(AwardOutcome {
        skipped: false,
        reason: None,
        dedupe_key: key,
        points_delta: points,
        newly_granted_badges: granted,
        level_up: (level_after > level_before).then_some(LevelChange {
            from: level_before,
            to: level_after,
        }),
    })
}

/// Run catalog and mapping evaluation under a savepoint. A failure rolls
/// back any partial grants, restores `stats`, and is logged; the award stands.
fn evaluate_badges_contained(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    request: &AwardRequest,
    stats: &mut rollcall_core::UserGamificationStats,
    now: DateTime<Utc>,
) -> Result<Vec<BadgeGrant>> {
    if !ctx.badges.enabled() {
        return Ok(Vec::new());
    }
    let snapshot = stats.clone();
    conn.execute_batch("SAVEPOINT badge_evaluation")?;
    match evaluate_badges(conn, ctx, request, stats, now) {
        Ok(grants) => {
            conn.execute_batch("RELEASE badge_evaluation")?;
            Ok(grants)
        }
        Err(e) => {
            conn.execute_batch("ROLLBACK TO badge_evaluation; RELEASE badge_evaluation")?;
            *stats = snapshot;
            warn!(user_id = stats.user_id, kind = e.kind(), "Badge evaluation failed: {e}");
            Ok(Vec::new())
        }
    }
}

fn evaluate_badges(
    conn: &Connection,
    ctx: &RewardContext<'_>,
    request: &AwardRequest,
    stats: &mut rollcall_core::UserGamificationStats,
    now: DateTime<Utc>,
) -> Result<Vec<BadgeGrant>> {
    let mut grants = ctx.badges.evaluate_catalog(conn, stats, now)?;
    let event_type = award_event_type(conn, request)?;
    let trigger = MappingTrigger {
        action: request.action,
        role: request.recipient_role,
        event_id: request.event_id,
        event_type: event_type.as_deref(),
    };
    grants.extend(ctx.badges.evaluate_mappings(conn, stats, &trigger, now)?);
    Ok(grants)
}

/// The awarded event's type, else an `event_type` string in the metadata.
fn award_event_type(conn: &Connection, request: &AwardRequest) -> Result<Option<String>> {
    let from_event = match request.event_id {
        Some(event_id) => events::get(conn, event_id)?.and_then(|event| event.event_type),
        None => None,
    };
    Ok(from_event.or_else(|| {
        request
            .metadata
            .as_ref()
            .and_then(|m| m.get("event_type"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }))
}
