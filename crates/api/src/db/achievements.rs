//! Achievement catalog, grant, and progress query builders.

use sea_query::{
    Cond, Expr, Func, OnConflict, Order, Query, SelectStatement, SqliteQueryBuilder,
};

use super::tables::{
    AchievementMappings, AchievementProgressAudit, Achievements, UserAchievementProgress,
    UserAchievements,
};

pub type Built = (String, sea_query::Values);

const CATALOG_COLUMNS: [Achievements; 10] = [
    Achievements::AchievementId,
    Achievements::BadgeCode,
    Achievements::Name,
    Achievements::Description,
    Achievements::ThresholdType,
    Achievements::ThresholdValue,
    Achievements::Thresholds,
    Achievements::TierPoints,
    Achievements::AchievementPoints,
    Achievements::IsActive,
];

// ─── Catalog ────────────────────────────────────────────────────────────────

/// Active threshold badges the user does not own yet, in display order.
pub fn unowned_threshold_badges(user_id: i64) -> Built {
    Query::select()
        .columns(CATALOG_COLUMNS)
        .from(Achievements::Table)
        .and_where(Expr::col(Achievements::IsActive).eq(true))
        .and_where(Expr::col(Achievements::ThresholdType).is_not_null())
        .and_where(
            Expr::col(Achievements::AchievementId).not_in_subquery(
                Query::select()
                    .column(UserAchievements::AchievementId)
                    .from(UserAchievements::Table)
                    .and_where(Expr::col(UserAchievements::UserId).eq(user_id))
                    .to_owned(),
            ),
        )
        .order_by(Achievements::DisplayOrder, Order::Asc)
        .order_by(Achievements::AchievementId, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn by_code(badge_code: &str) -> Built {
    Query::select()
        .columns(CATALOG_COLUMNS)
        .from(Achievements::Table)
        .and_where(Expr::col(Achievements::BadgeCode).eq(badge_code))
        .build(SqliteQueryBuilder)
}

// ─── Grants ─────────────────────────────────────────────────────────────────

/// Grant a badge; a second grant of the same achievement is ignored.
pub fn grant(
    user_id: i64,
    achievement_id: i64,
    badge_level: Option<&str>,
    earned_at: &str,
    awarded_by: Option<i64>,
) -> Built {
    Query::insert()
        .into_table(UserAchievements::Table)
        .columns([
            UserAchievements::UserId,
            UserAchievements::AchievementId,
            UserAchievements::BadgeLevel,
            UserAchievements::EarnedAt,
            UserAchievements::AwardedBy,
        ])
        .values_panic([
            user_id.into(),
            achievement_id.into(),
            badge_level.map(str::to_string).into(),
            earned_at.into(),
            awarded_by.into(),
        ])
        .on_conflict(
            OnConflict::columns([UserAchievements::UserId, UserAchievements::AchievementId])
                .do_nothing()
                .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

/// Record a higher tier on an existing grant.
pub fn upgrade_grant_level(user_id: i64, achievement_id: i64, badge_level: &str) -> Built {
    Query::update()
        .table(UserAchievements::Table)
        .value(UserAchievements::BadgeLevel, badge_level)
        .and_where(Expr::col(UserAchievements::UserId).eq(user_id))
        .and_where(Expr::col(UserAchievements::AchievementId).eq(achievement_id))
        .build(SqliteQueryBuilder)
}

/// Earned badges joined with their catalog rows, newest first.
pub fn earned_by_user(user_id: i64) -> Built {
    Query::select()
        .column((Achievements::Table, Achievements::AchievementId))
        .column((Achievements::Table, Achievements::BadgeCode))
        .column((Achievements::Table, Achievements::Name))
        .column((UserAchievements::Table, UserAchievements::BadgeLevel))
        .column((UserAchievements::Table, UserAchievements::EarnedAt))
        .from(UserAchievements::Table)
        .inner_join(
            Achievements::Table,
            Expr::col((Achievements::Table, Achievements::AchievementId))
                .equals((UserAchievements::Table, UserAchievements::AchievementId)),
        )
        .and_where(Expr::col((UserAchievements::Table, UserAchievements::UserId)).eq(user_id))
        .order_by((UserAchievements::Table, UserAchievements::EarnedAt), Order::Desc)
        .order_by(
            (UserAchievements::Table, UserAchievements::UserAchievementId),
            Order::Desc,
        )
        .build(SqliteQueryBuilder)
}

pub fn count_grants(user_id: i64) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(UserAchievements::UserAchievementId)))
        .from(UserAchievements::Table)
        .and_where(Expr::col(UserAchievements::UserId).eq(user_id))
        .build(SqliteQueryBuilder)
}

// ─── Mappings ───────────────────────────────────────────────────────────────

/// Stored `trigger_action` that matches every action.
pub const ANY_TRIGGER: &str = "ANY";
/// Stored `target_role` that matches every role.
pub const ANY_ROLE: &str = "any";

pub struct NewMapping<'a> {
    pub achievement_id: i64,
    pub event_id: Option<i64>,
    pub event_type: Option<&'a str>,
    pub trigger_action: &'a str,
    pub target_role: &'a str,
    pub created_by: Option<i64>,
    pub created_at: &'a str,
}

pub fn insert_mapping(mapping: &NewMapping<'_>) -> Built {
    Query::insert()
        .into_table(AchievementMappings::Table)
        .columns([
            AchievementMappings::AchievementId,
            AchievementMappings::EventId,
            AchievementMappings::EventType,
            AchievementMappings::TriggerAction,
            AchievementMappings::TargetRole,
            AchievementMappings::CreatedBy,
            AchievementMappings::CreatedAt,
        ])
        .values_panic([
            mapping.achievement_id.into(),
            mapping.event_id.into(),
            mapping.event_type.map(str::to_string).into(),
            mapping.trigger_action.into(),
            mapping.target_role.into(),
            mapping.created_by.into(),
            mapping.created_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

fn mapping_select() -> SelectStatement {
    Query::select()
        .columns([
            (AchievementMappings::Table, AchievementMappings::MappingId),
            (AchievementMappings::Table, AchievementMappings::AchievementId),
            (AchievementMappings::Table, AchievementMappings::EventId),
            (AchievementMappings::Table, AchievementMappings::EventType),
            (AchievementMappings::Table, AchievementMappings::TriggerAction),
            (AchievementMappings::Table, AchievementMappings::TargetRole),
            (AchievementMappings::Table, AchievementMappings::IsActive),
            (AchievementMappings::Table, AchievementMappings::CreatedBy),
            (AchievementMappings::Table, AchievementMappings::CreatedAt),
        ])
        .column((Achievements::Table, Achievements::BadgeCode))
        .from(AchievementMappings::Table)
        .inner_join(
            Achievements::Table,
            Expr::col((Achievements::Table, Achievements::AchievementId))
                .equals((AchievementMappings::Table, AchievementMappings::AchievementId)),
        )
        .to_owned()
}

pub fn get_mapping(mapping_id: i64) -> Built {
    mapping_select()
        .and_where(Expr::col((AchievementMappings::Table, AchievementMappings::MappingId)).eq(mapping_id))
        .build(SqliteQueryBuilder)
}

/// Mappings joined with their badge code, oldest first.
pub fn list_mappings(active_only: bool) -> Built {
    let mut query = mapping_select();
    if active_only {
        query.and_where(Expr::col((AchievementMappings::Table, AchievementMappings::IsActive)).eq(true));
    }
    query
        .order_by((AchievementMappings::Table, AchievementMappings::MappingId), Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn set_mapping_active(mapping_id: i64, active: bool) -> Built {
    Query::update()
        .table(AchievementMappings::Table)
        .value(AchievementMappings::IsActive, active)
        .and_where(Expr::col(AchievementMappings::MappingId).eq(mapping_id))
        .build(SqliteQueryBuilder)
}

/// What an award looks like to the mapping matcher.
pub struct MappingMatch<'a> {
    pub trigger_action: &'a str,
    pub target_role: Option<&'a str>,
    pub event_id: Option<i64>,
    pub event_type: Option<&'a str>,
}

/// Active catalog rows mapped to an award.
///
/// A mapping applies when its trigger is the award's action or `ANY`, its
/// role is the recipient's or `any`, and it is pinned to the award's event
/// or, unpinned, to the event's type or to no type at all.
pub fn mapped_achievements(m: &MappingMatch<'_>) -> Built {
    let mapping = |col: AchievementMappings| Expr::col((AchievementMappings::Table, col));
    let roles: Vec<&str> = m.target_role.into_iter().chain([ANY_ROLE]).collect();
    let by_type = match m.event_type {
        Some(event_type) => Cond::any()
            .add(mapping(AchievementMappings::EventType).is_null())
            .add(mapping(AchievementMappings::EventType).eq(event_type)),
        None => Cond::all().add(mapping(AchievementMappings::EventType).is_null()),
    };
    let unpinned = Cond::all()
        .add(mapping(AchievementMappings::EventId).is_null())
        .add(by_type);
    let scope = match m.event_id {
        Some(event_id) => Cond::any()
            .add(mapping(AchievementMappings::EventId).eq(event_id))
            .add(unpinned),
        None => unpinned,
    };

    Query::select()
        .distinct()
        .columns(CATALOG_COLUMNS.map(|col| (Achievements::Table, col)))
        .column((Achievements::Table, Achievements::DisplayOrder))
        .from(AchievementMappings::Table)
        .inner_join(
            Achievements::Table,
            Expr::col((Achievements::Table, Achievements::AchievementId))
                .equals((AchievementMappings::Table, AchievementMappings::AchievementId)),
        )
        .and_where(mapping(AchievementMappings::IsActive).eq(true))
        .and_where(Expr::col((Achievements::Table, Achievements::IsActive)).eq(true))
        .and_where(mapping(AchievementMappings::TriggerAction).is_in([m.trigger_action, ANY_TRIGGER]))
        .and_where(mapping(AchievementMappings::TargetRole).is_in(roles))
        .cond_where(scope)
        .order_by((Achievements::Table, Achievements::DisplayOrder), Order::Asc)
        .order_by((Achievements::Table, Achievements::AchievementId), Order::Asc)
        .build(SqliteQueryBuilder)
}

// ─── Progress ───────────────────────────────────────────────────────────────

pub fn progress(user_id: i64, code: &str) -> Built {
    Query::select()
        .columns([
            UserAchievementProgress::UserId,
            UserAchievementProgress::AchievementCode,
            UserAchievementProgress::CurrentCount,
            UserAchievementProgress::BadgeLevel,
            UserAchievementProgress::LastUpdatedAt,
        ])
        .from(UserAchievementProgress::Table)
        .and_where(Expr::col(UserAchievementProgress::UserId).eq(user_id))
        .and_where(Expr::col(UserAchievementProgress::AchievementCode).eq(code))
        .build(SqliteQueryBuilder)
}

pub fn progress_for_user(user_id: i64) -> Built {
    Query::select()
        .columns([
            UserAchievementProgress::UserId,
            UserAchievementProgress::AchievementCode,
            UserAchievementProgress::CurrentCount,
            UserAchievementProgress::BadgeLevel,
            UserAchievementProgress::LastUpdatedAt,
        ])
        .from(UserAchievementProgress::Table)
        .and_where(Expr::col(UserAchievementProgress::UserId).eq(user_id))
        .order_by(UserAchievementProgress::AchievementCode, Order::Asc)
        .build(SqliteQueryBuilder)
}

pub fn upsert_progress(
    user_id: i64,
    code: &str,
    current_count: i64,
    badge_level: &str,
    now: &str,
) -> Built {
    Query::insert()
        .into_table(UserAchievementProgress::Table)
        .columns([
            UserAchievementProgress::UserId,
            UserAchievementProgress::AchievementCode,
            UserAchievementProgress::CurrentCount,
            UserAchievementProgress::BadgeLevel,
            UserAchievementProgress::LastUpdatedAt,
        ])
        .values_panic([
            user_id.into(),
            code.into(),
            current_count.into(),
            badge_level.into(),
            now.into(),
        ])
        .on_conflict(
            OnConflict::columns([
                UserAchievementProgress::UserId,
                UserAchievementProgress::AchievementCode,
            ])
            .update_columns([
                UserAchievementProgress::CurrentCount,
                UserAchievementProgress::BadgeLevel,
                UserAchievementProgress::LastUpdatedAt,
            ])
            .to_owned(),
        )
        .build(SqliteQueryBuilder)
}

/// One processed progress change.
pub struct NewProgressAudit<'a> {
    pub user_id: i64,
    pub event_id: Option<i64>,
    pub code: &'a str,
    pub delta: i64,
    pub meta: Option<&'a str>,
    pub job_id: Option<&'a str>,
    pub created_at: &'a str,
}

pub fn insert_progress_audit(audit: &NewProgressAudit<'_>) -> Built {
    Query::insert()
        .into_table(AchievementProgressAudit::Table)
        .columns([
            AchievementProgressAudit::UserId,
            AchievementProgressAudit::EventId,
            AchievementProgressAudit::AchievementCode,
            AchievementProgressAudit::Delta,
            AchievementProgressAudit::Meta,
            AchievementProgressAudit::JobId,
            AchievementProgressAudit::CreatedAt,
        ])
        .values_panic([
            audit.user_id.into(),
            audit.event_id.into(),
            audit.code.into(),
            audit.delta.into(),
            audit.meta.map(str::to_string).into(),
            audit.job_id.map(str::to_string).into(),
            audit.created_at.into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Whether `(user, event, code)` has already been processed.
pub fn progress_audit_count(user_id: i64, event_id: i64, code: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(AchievementProgressAudit::Id)))
        .from(AchievementProgressAudit::Table)
        .and_where(Expr::col(AchievementProgressAudit::UserId).eq(user_id))
        .and_where(Expr::col(AchievementProgressAudit::EventId).eq(event_id))
        .and_where(Expr::col(AchievementProgressAudit::AchievementCode).eq(code))
        .build(SqliteQueryBuilder)
}
