//! Badge evaluation.
//!
//! Two strategies live here side by side:
//!
//! - **Catalog badges** are single-level grants checked against aggregate
//!   stats (points, registrations, attendance, hosting, streak) after every
//!   award.
//! - **Named achievements** ([`AchievementCode`]) track a counter per user
//!   and promote through bronze, silver, and gold tiers.
//! - **Mapped achievements** are admin-configured grants tied to an action,
//!   optionally narrowed to one event, an event type, or a recipient role.
//!
//! Both are switched off together by `gamification.enable_badges`. Bonus
//! points are not awarded here; callers receive the grants and route the
//! bonuses through the ledger.

use chrono::{DateTime, Utc};
use rollcall_api::db::achievements::{self as achievement_sql, ANY_ROLE, ANY_TRIGGER};
use rollcall_api::db::stats as stats_sql;
use rollcall_api::{
    AchievementMapping, AchievementProgress, EarnedBadge, NewAchievementMapping, Role,
};
use rollcall_core::achievement::tier_bonus;
use rollcall_core::{
    AchievementCode, BadgeLevel, GamificationAction, RuleError, ThresholdKind, TierPoints,
    TierThresholds, UserGamificationStats,
};
use rusqlite::{Connection, Row};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::sql::{self, fmt_ts, parsed_col, ts_col};

/// One row of the achievement catalog.
#[derive(Debug, Clone)]
pub struct CatalogBadge {
    pub achievement_id: i64,
    pub badge_code: String,
    pub name: String,
    pub description: Option<String>,
    pub threshold_type: Option<String>,
    pub threshold_value: Option<i64>,
    pub thresholds: Option<TierThresholds>,
    pub tier_points: Option<TierPoints>,
    pub achievement_points: i64,
    pub is_active: bool,
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(col)?;
    raw.map(|raw| {
        serde_json::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

fn catalog_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogBadge> {
    Ok(CatalogBadge {
        achievement_id: row.get("achievement_id")?,
        badge_code: row.get("badge_code")?,
        name: row.get("name")?,
        description: row.get("description")?,
        threshold_type: row.get("threshold_type")?,
        threshold_value: row.get("threshold_value")?,
        thresholds: json_col(row, "thresholds")?,
        tier_points: json_col(row, "tier_points")?,
        achievement_points: row.get("achievement_points")?,
        is_active: row.get("is_active")?,
    })
}

/// A badge granted during evaluation, with the bonus it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeGrant {
    pub achievement_id: i64,
    pub badge_code: String,
    pub name: String,
    pub level: Option<BadgeLevel>,
    pub bonus_points: i64,
}

/// Where a progress change came from, for the audit trail.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressSource<'a> {
    pub event_id: Option<i64>,
    pub meta: Option<&'a serde_json::Value>,
    pub job_id: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressChange {
    pub code: AchievementCode,
    pub previous_count: i64,
    pub current_count: i64,
    pub previous_level: BadgeLevel,
    pub level: BadgeLevel,
    /// Set when the change reached a new tier.
    pub promotion: Option<BadgeGrant>,
}

/// The parts of an award that select mapped achievements.
#[derive(Debug, Clone, Copy)]
pub struct MappingTrigger<'a> {
    pub action: GamificationAction,
    pub role: Option<Role>,
    pub event_id: Option<i64>,
    pub event_type: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
pub struct BadgeEvaluator {
    enabled: bool,
}

impl BadgeEvaluator {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    // ── Catalog badges ──────────────────────────────────────────────────

    /// Grant every unowned catalog badge whose threshold `stats` now meets.
    ///
    /// Updates `badges_earned` and `last_badge_awarded_at` on `stats` in
    /// memory; the caller persists it.
    pub fn evaluate_catalog(
        &self,
        conn: &Connection,
        stats: &mut UserGamificationStats,
        now: DateTime<Utc>,
    ) -> Result<Vec<BadgeGrant>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let candidates = sql::query_all(
            conn,
            achievement_sql::unowned_threshold_badges(stats.user_id),
            catalog_from_row,
        )?;

        let earned_at = fmt_ts(now);
        let mut grants = Vec::new();
        for badge in candidates {
            let (Some(kind), Some(threshold)) = (badge.threshold_type.as_deref(), badge.threshold_value)
            else {
                continue;
            };
            let kind = match kind.parse::<ThresholdKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::warn!(badge = %badge.badge_code, "Skipping badge: {e}");
                    continue;
                }
            };
            if !kind.meets(threshold, stats) {
                continue;
            }
            let inserted = sql::execute(
                conn,
                achievement_sql::grant(stats.user_id, badge.achievement_id, None, &earned_at, None),
            )?;
            if inserted == 0 {
                continue;
            }
            stats.badges_earned += 1;
            stats.last_badge_awarded_at = Some(now);
            tracing::info!(user_id = stats.user_id, badge = %badge.badge_code, "Badge granted");
            grants.push(BadgeGrant {
                achievement_id: badge.achievement_id,
                badge_code: badge.badge_code,
                name: badge.name,
                level: None,
                bonus_points: badge.achievement_points,
            });
        }
        Ok(grants)
    }

    // ── Mapped achievements ─────────────────────────────────────────────

    /// Grant every unowned achievement mapped to `trigger`.
    ///
    /// The bonus is the catalog's `single` tier points, else its flat
    /// achievement points. Like [`Self::evaluate_catalog`], `stats` is only
    /// updated in memory.
    pub fn evaluate_mappings(
        &self,
        conn: &Connection,
        stats: &mut UserGamificationStats,
        trigger: &MappingTrigger<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<BadgeGrant>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let candidates = sql::query_all(
            conn,
            achievement_sql::mapped_achievements(&achievement_sql::MappingMatch {
                trigger_action: trigger.action.as_str(),
                target_role: trigger.role.as_ref().map(Role::as_str),
                event_id: trigger.event_id,
                event_type: trigger.event_type,
            }),
            catalog_from_row,
        )?;

        let earned_at = fmt_ts(now);
        let mut grants = Vec::new();
        for badge in candidates {
            let inserted = sql::execute(
                conn,
                achievement_sql::grant(stats.user_id, badge.achievement_id, None, &earned_at, None),
            )?;
            if inserted == 0 {
                continue;
            }
            stats.badges_earned += 1;
            stats.last_badge_awarded_at = Some(now);
            tracing::info!(
                user_id = stats.user_id,
                badge = %badge.badge_code,
                action = %trigger.action,
                "Mapped achievement granted"
            );
            let bonus_points = badge
                .tier_points
                .and_then(|tiers| tiers.single)
                .unwrap_or(badge.achievement_points);
            grants.push(BadgeGrant {
                achievement_id: badge.achievement_id,
                badge_code: badge.badge_code,
                name: badge.name,
                level: None,
                bonus_points,
            });
        }
        Ok(grants)
    }

    // ── Named achievements ──────────────────────────────────────────────

    /// Whether `(user, event, code)` was already processed.
    pub fn audit_exists(
        &self,
        conn: &Connection,
        user_id: i64,
        event_id: i64,
        code: AchievementCode,
    ) -> Result<bool> {
        Ok(sql::query_count(
            conn,
            achievement_sql::progress_audit_count(user_id, event_id, code.as_str()),
        )? > 0)
    }

    pub fn increment_progress(
        &self,
        conn: &Connection,
        user_id: i64,
        code: AchievementCode,
        delta: i64,
        source: ProgressSource<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<ProgressChange>> {
        self.apply_progress(conn, user_id, code, source, now, |count| (count + delta).max(0))
    }

    /// Overwrite the counter. A lower count never lowers the tier reached.
    pub fn set_progress(
        &self,
        conn: &Connection,
        user_id: i64,
        code: AchievementCode,
        count: i64,
        source: ProgressSource<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<ProgressChange>> {
        self.apply_progress(conn, user_id, code, source, now, |_| count.max(0))
    }

    fn apply_progress(
        &self,
        conn: &Connection,
        user_id: i64,
        code: AchievementCode,
        source: ProgressSource<'_>,
        now: DateTime<Utc>,
        next: impl FnOnce(i64) -> i64,
    ) -> Result<Option<ProgressChange>> {
        if !self.enabled {
            return Ok(None);
        }
        let catalog = sql::query_opt(conn, achievement_sql::by_code(code.as_str()), catalog_from_row)?;
        let thresholds = catalog
            .as_ref()
            .and_then(|badge| badge.thresholds)
            .unwrap_or_else(|| code.default_thresholds())
            .validated(code.as_str())?;

        let current = progress(conn, user_id, code)?;
        let previous_count = current.as_ref().map_or(0, |p| p.current_count);
        let previous_level = current.as_ref().map_or(BadgeLevel::None, |p| p.badge_level);
        let current_count = next(previous_count);
        let level = previous_level.max(thresholds.level_for(current_count));

        let stamp = fmt_ts(now);
        let meta = source.meta.map(serde_json::to_string).transpose()?;
        sql::execute(
            conn,
            achievement_sql::insert_progress_audit(&achievement_sql::NewProgressAudit {
                user_id,
                event_id: source.event_id,
                code: code.as_str(),
                delta: current_count - previous_count,
                meta: meta.as_deref(),
                job_id: source.job_id,
                created_at: &stamp,
            }),
        )?;
        sql::execute(
            conn,
            achievement_sql::upsert_progress(user_id, code.as_str(), current_count, level.as_str(), &stamp),
        )?;

        let promotion = match (&catalog, level > previous_level) {
            (Some(badge), true) => Some(self.grant_tier(conn, user_id, badge, level, &stamp)?),
            (None, true) => {
                tracing::warn!(code = code.as_str(), "Tier reached without a catalog row");
                None
            }
            _ => None,
        };

        Ok(Some(ProgressChange {
            code,
            previous_count,
            current_count,
            previous_level,
            level,
            promotion,
        }))
    }

    fn grant_tier(
        &self,
        conn: &Connection,
        user_id: i64,
        badge: &CatalogBadge,
        level: BadgeLevel,
        stamp: &str,
    ) -> Result<BadgeGrant> {
        let inserted = sql::execute(
            conn,
            achievement_sql::grant(user_id, badge.achievement_id, Some(level.as_str()), stamp, None),
        )?;
        if inserted > 0 {
            sql::execute(conn, stats_sql::ensure(user_id, stamp))?;
            sql::execute(conn, stats_sql::increment_badges(user_id, stamp))?;
        } else {
            sql::execute(
                conn,
                achievement_sql::upgrade_grant_level(user_id, badge.achievement_id, level.as_str()),
            )?;
        }
        tracing::info!(user_id, badge = %badge.badge_code, level = level.as_str(), "Achievement tier reached");
        Ok(BadgeGrant {
            achievement_id: badge.achievement_id,
            badge_code: badge.badge_code.clone(),
            name: badge.name.clone(),
            level: Some(level),
            bonus_points: tier_bonus(badge.tier_points.as_ref(), badge.achievement_points, level),
        })
    }
}

// ─── Reads ──────────────────────────────────────────────────────────────────

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<AchievementProgress> {
    Ok(AchievementProgress {
        achievement_code: row.get("achievement_code")?,
        current_count: row.get("current_count")?,
        badge_level: parsed_col(row, "badge_level")?,
        last_updated_at: ts_col(row, "last_updated_at")?,
    })
}

pub fn progress(
    conn: &Connection,
    user_id: i64,
    code: AchievementCode,
) -> Result<Option<AchievementProgress>> {
    Ok(sql::query_opt(
        conn,
        achievement_sql::progress(user_id, code.as_str()),
        progress_from_row,
    )?)
}

pub fn progress_for_user(conn: &Connection, user_id: i64) -> Result<Vec<AchievementProgress>> {
    Ok(sql::query_all(
        conn,
        achievement_sql::progress_for_user(user_id),
        progress_from_row,
    )?)
}

pub fn earned_badges(conn: &Connection, user_id: i64) -> Result<Vec<EarnedBadge>> {
    Ok(sql::query_all(conn, achievement_sql::earned_by_user(user_id), |row| {
        let level: Option<String> = row.get("badge_level")?;
        Ok(EarnedBadge {
            achievement_id: row.get("achievement_id")?,
            badge_code: row.get("badge_code")?,
            name: row.get("name")?,
            badge_level: level.and_then(|l| l.parse().ok()),
            earned_at: ts_col(row, "earned_at")?,
        })
    })?)
}

// ─── Mapping admin ──────────────────────────────────────────────────────────

/// Actions an achievement mapping may be triggered by.
pub const MAPPABLE_ACTIONS: [GamificationAction; 4] = [
    GamificationAction::EventRegister,
    GamificationAction::EventAttend,
    GamificationAction::EventHostPublished,
    GamificationAction::EventCancel,
];

/// Parse a column that stores `any` as a wildcard.
fn wildcard_col<T>(row: &Row<'_>, col: &str, any: &str) -> rusqlite::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(col)?;
    if raw == any {
        Ok(None)
    } else {
        parsed_col(row, col).map(Some)
    }
}

fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<AchievementMapping> {
    Ok(AchievementMapping {
        mapping_id: row.get("mapping_id")?,
        achievement_id: row.get("achievement_id")?,
        badge_code: row.get("badge_code")?,
        event_id: row.get("event_id")?,
        event_type: row.get("event_type")?,
        trigger_action: wildcard_col(row, "trigger_action", ANY_TRIGGER)?,
        target_role: wildcard_col(row, "target_role", ANY_ROLE)?,
        is_active: row.get("is_active")?,
        created_by: row.get("created_by")?,
        created_at: ts_col(row, "created_at")?,
    })
}

pub fn create_mapping(
    conn: &Connection,
    request: &NewAchievementMapping,
    now: DateTime<Utc>,
) -> Result<AchievementMapping> {
    if let Some(action) = request.trigger_action {
        if !MAPPABLE_ACTIONS.contains(&action) {
            return Err(StoreError::validation(format!(
                "{action} cannot trigger an achievement mapping"
            )));
        }
    }
    if request.target_role == Some(Role::System) {
        return Err(StoreError::validation(
            "Achievement mappings cannot target the system role",
        ));
    }
    let badge = catalog_badge(conn, &request.badge_code)?;
    let stamp = fmt_ts(now);
    sql::execute(
        conn,
        achievement_sql::insert_mapping(&achievement_sql::NewMapping {
            achievement_id: badge.achievement_id,
            event_id: request.event_id,
            event_type: request.event_type.as_deref(),
            trigger_action: request.trigger_action.map_or(ANY_TRIGGER, |a| a.as_str()),
            target_role: request.target_role.as_ref().map_or(ANY_ROLE, Role::as_str),
            created_by: request.created_by,
            created_at: &stamp,
        }),
    )?;
    let created = mapping(conn, conn.last_insert_rowid())?;
    tracing::info!(mapping_id = created.mapping_id, badge = %created.badge_code, "Achievement mapping created");
    Ok(created)
}

pub fn mapping(conn: &Connection, mapping_id: i64) -> Result<AchievementMapping> {
    sql::query_opt(conn, achievement_sql::get_mapping(mapping_id), mapping_from_row)?
        .ok_or_else(|| StoreError::not_found("Achievement mapping not found"))
}

pub fn list_mappings(conn: &Connection, active_only: bool) -> Result<Vec<AchievementMapping>> {
    Ok(sql::query_all(
        conn,
        achievement_sql::list_mappings(active_only),
        mapping_from_row,
    )?)
}

pub fn set_mapping_active(
    conn: &Connection,
    mapping_id: i64,
    active: bool,
) -> Result<AchievementMapping> {
    if sql::execute(conn, achievement_sql::set_mapping_active(mapping_id, active))? == 0 {
        return Err(StoreError::not_found("Achievement mapping not found"));
    }
    mapping(conn, mapping_id)
}

/// Catalog lookup that fails on unknown codes.
pub fn catalog_badge(conn: &Connection, badge_code: &str) -> Result<CatalogBadge> {
    sql::query_opt(conn, achievement_sql::by_code(badge_code), catalog_from_row)?
        .ok_or_else(|| RuleError::UnknownAchievement(badge_code.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger;
    use crate::test_support::test_db;
    use rollcall_core::testing::event_start;

    fn on() -> BadgeEvaluator {
        BadgeEvaluator::new(true)
    }

    #[test]
    fn catalog_grants_once() {
        let db = test_db();
        let now = event_start();
        db.with_tx(|tx| {
            let mut stats = ledger::ensure_stats(tx, 1, now)?;
            stats.events_attended = 1;
            let grants = on().evaluate_catalog(tx, &mut stats, now)?;
            assert_eq!(grants.len(), 1);
            assert_eq!(grants[0].badge_code, "first_steps");
            assert_eq!(grants[0].bonus_points, 10);
            assert_eq!(stats.badges_earned, 1);
            assert!(on().evaluate_catalog(tx, &mut stats, now)?.is_empty());
            assert_eq!(stats.badges_earned, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn catalog_checks_every_threshold_kind() {
        let db = test_db();
        let now = event_start();
        let codes = db
            .with_tx(|tx| {
                let mut stats = ledger::ensure_stats(tx, 2, now)?;
                stats.total_points = 500;
                stats.events_registered = 5;
                stats.events_hosted = 1;
                stats.longest_streak = 5;
                let grants = on().evaluate_catalog(tx, &mut stats, now)?;
                Ok(grants.into_iter().map(|g| g.badge_code).collect::<Vec<_>>())
            })
            .unwrap();
        assert_eq!(
            codes,
            vec!["signup_spree", "first_host", "point_collector", "streak_keeper"]
        );
    }

    #[test]
    fn disabled_evaluator_grants_nothing() {
        let db = test_db();
        let now = event_start();
        db.with_tx(|tx| {
            let mut stats = ledger::ensure_stats(tx, 3, now)?;
            stats.events_attended = 50;
            let off = BadgeEvaluator::new(false);
            assert!(off.evaluate_catalog(tx, &mut stats, now)?.is_empty());
            let change = off.increment_progress(tx, 3, AchievementCode::PunctualPro, 1, ProgressSource::default(), now)?;
            assert!(change.is_none());
            assert!(progress_for_user(tx, 3)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn progress_promotes_through_tiers() {
        let db = test_db();
        let now = event_start();
        db.with_tx(|tx| {
            let source = ProgressSource {
                event_id: Some(9),
                ..ProgressSource::default()
            };
            let first = on()
                .increment_progress(tx, 4, AchievementCode::OcrWizard, 1, source, now)?
                .unwrap();
            assert_eq!(first.level, BadgeLevel::Bronze);
            let grant = first.promotion.unwrap();
            assert_eq!(grant.bonus_points, 10);
            assert!(on().audit_exists(tx, 4, 9, AchievementCode::OcrWizard)?);

            let second = on()
                .increment_progress(tx, 4, AchievementCode::OcrWizard, 1, ProgressSource::default(), now)?
                .unwrap();
            assert_eq!(second.current_count, 2);
            assert!(second.promotion.is_none());

            let silver = on()
                .increment_progress(tx, 4, AchievementCode::OcrWizard, 3, ProgressSource::default(), now)?
                .unwrap();
            assert_eq!(silver.level, BadgeLevel::Silver);
            assert_eq!(silver.promotion.unwrap().bonus_points, 25);

            let earned = earned_badges(tx, 4)?;
            assert_eq!(earned.len(), 1);
            assert_eq!(earned[0].badge_level, Some(BadgeLevel::Silver));
            assert_eq!(ledger::load_stats(tx, 4)?.unwrap().badges_earned, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn resetting_progress_keeps_the_tier() {
        let db = test_db();
        let now = event_start();
        db.with_tx(|tx| {
            let reached = on()
                .set_progress(tx, 5, AchievementCode::PerfectStreak, 3, ProgressSource::default(), now)?
                .unwrap();
            assert_eq!(reached.level, BadgeLevel::Bronze);
            let reset = on()
                .set_progress(tx, 5, AchievementCode::PerfectStreak, 0, ProgressSource::default(), now)?
                .unwrap();
            assert_eq!(reset.current_count, 0);
            assert_eq!(reset.level, BadgeLevel::Bronze);
            assert!(reset.promotion.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn unknown_catalog_code_is_a_rule_error() {
        let db = test_db();
        let err = db.with_conn(|conn| catalog_badge(conn, "nope")).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    fn mapping_request(badge_code: &str) -> NewAchievementMapping {
        NewAchievementMapping {
            badge_code: badge_code.to_string(),
            event_id: None,
            event_type: None,
            trigger_action: None,
            target_role: None,
            created_by: Some(1),
        }
    }

    #[test]
    fn pinned_mapping_grants_once_for_its_event() {
        let db = test_db();
        let now = event_start();
        db.with_tx(|tx| {
            let pinned = create_mapping(
                tx,
                &NewAchievementMapping {
                    event_id: Some(42),
                    ..mapping_request("first_host")
                },
                now,
            )?;
            assert_eq!(pinned.trigger_action, None);
            assert_eq!(pinned.target_role, None);

            let trigger = |event_id| MappingTrigger {
                action: GamificationAction::EventRegister,
                role: None,
                event_id,
                event_type: None,
            };
            let mut stats = ledger::ensure_stats(tx, 4, now)?;
            assert!(on().evaluate_mappings(tx, &mut stats, &trigger(Some(41)), now)?.is_empty());
            assert!(on().evaluate_mappings(tx, &mut stats, &trigger(None), now)?.is_empty());

            let grants = on().evaluate_mappings(tx, &mut stats, &trigger(Some(42)), now)?;
            assert_eq!(grants.len(), 1);
            assert_eq!(grants[0].badge_code, "first_host");
            assert_eq!(grants[0].bonus_points, 20);
            assert_eq!(stats.badges_earned, 1);
            assert!(on().evaluate_mappings(tx, &mut stats, &trigger(Some(42)), now)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn mappings_respect_role_type_and_active_flag() {
        let db = test_db();
        let now = event_start();
        db.with_tx(|tx| {
            let mapping = create_mapping(
                tx,
                &NewAchievementMapping {
                    event_type: Some("workshop".into()),
                    trigger_action: Some(GamificationAction::EventAttend),
                    target_role: Some(Role::Staff),
                    ..mapping_request("signup_spree")
                },
                now,
            )?;
            let mut stats = ledger::ensure_stats(tx, 6, now)?;
            let attend = |role, event_type| MappingTrigger {
                action: GamificationAction::EventAttend,
                role,
                event_id: Some(3),
                event_type,
            };

            assert!(on().evaluate_mappings(tx, &mut stats, &attend(Some(Role::Volunteer), Some("workshop")), now)?.is_empty());
            assert!(on().evaluate_mappings(tx, &mut stats, &attend(Some(Role::Staff), Some("meetup")), now)?.is_empty());

            set_mapping_active(tx, mapping.mapping_id, false)?;
            assert!(list_mappings(tx, true)?.is_empty());
            assert!(on().evaluate_mappings(tx, &mut stats, &attend(Some(Role::Staff), Some("workshop")), now)?.is_empty());

            set_mapping_active(tx, mapping.mapping_id, true)?;
            let grants = on().evaluate_mappings(tx, &mut stats, &attend(Some(Role::Staff), Some("workshop")), now)?;
            assert_eq!(grants.len(), 1);
            assert_eq!(grants[0].bonus_points, 15);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn mapped_tiered_achievement_prefers_single_tier_points() {
        let db = test_db();
        let now = event_start();
        db.with_tx(|tx| {
            tx.execute_batch(
                "UPDATE achievements SET tier_points = '{\"single\":12,\"gold\":50}'
                 WHERE badge_code = 'early_bird'",
            )?;
            create_mapping(tx, &mapping_request("early_bird"), now)?;
            create_mapping(tx, &mapping_request("punctual_pro"), now)?;
            let mut stats = ledger::ensure_stats(tx, 7, now)?;
            let trigger = MappingTrigger {
                action: GamificationAction::EventCancel,
                role: Some(Role::Member),
                event_id: None,
                event_type: None,
            };
            let grants = on().evaluate_mappings(tx, &mut stats, &trigger, now)?;
            let bonuses: Vec<(&str, i64)> = grants
                .iter()
                .map(|g| (g.badge_code.as_str(), g.bonus_points))
                .collect();
            // punctual_pro has tier points but no single entry: flat points apply.
            assert_eq!(bonuses, vec![("punctual_pro", 0), ("early_bird", 12)]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn mapping_admin_rejects_bad_requests() {
        let db = test_db();
        let now = event_start();
        let create = |request: NewAchievementMapping| {
            db.with_tx(|tx| create_mapping(tx, &request, now)).unwrap_err()
        };
        let err = create(NewAchievementMapping {
            trigger_action: Some(GamificationAction::WaitlistJoin),
            ..mapping_request("first_steps")
        });
        assert_eq!(err.kind(), "validation");
        let err = create(NewAchievementMapping {
            target_role: Some(Role::System),
            ..mapping_request("first_steps")
        });
        assert_eq!(err.kind(), "validation");
        assert_eq!(create(mapping_request("nope")).kind(), "validation");

        let err = db.with_tx(|tx| set_mapping_active(tx, 404, false)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
