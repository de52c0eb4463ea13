//! Shared contract types, schema migrations, and SQL builders for rollcall.
//!
//! Types here are what the engine hands back to callers (CLI, services).
//! The `backend` feature adds the SQLite schema and sea-query builders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod db;

pub use rollcall_core::{
    AttendanceStatus, BadgeLevel, EventStatus, GamificationAction, LevelProgress,
    LevelThreshold, ParticipationStatus, UserGamificationStats,
};

// ─── Actors ──────────────────────────────────────────────────────────────────

/// Role of whoever invokes an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Staff,
    Volunteer,
    Member,
    /// Scheduler and other internal jobs.
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Volunteer => "volunteer",
            Self::Member => "member",
            Self::System => "system",
        }
    }

    /// Staff, admins, and internal jobs may change attendance.
    pub fn can_manage_attendance(&self) -> bool {
        matches!(self, Self::Admin | Self::Staff | Self::System)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            "volunteer" => Ok(Self::Volunteer),
            "member" => Ok(Self::Member),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            role,
        }
    }

    pub fn system() -> Self {
        Self {
            user_id: None,
            role: Role::System,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Event fields the attendance rules read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventInfo {
    pub event_id: i64,
    pub uid: String,
    pub title: String,
    pub event_type: Option<String>,
    pub status: EventStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub checkin_window_mins: Option<i64>,
    pub grace_mins: Option<i64>,
    pub created_by: Option<i64>,
}

/// Request to create an event (seeding and tests; event CRUD lives elsewhere).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEventRequest {
    pub uid: String,
    pub title: String,
    #[serde(default)]
    pub event_type: Option<String>,
    pub status: EventStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub checkin_window_mins: Option<i64>,
    #[serde(default)]
    pub grace_mins: Option<i64>,
    #[serde(default)]
    pub created_by: Option<i64>,
}

// ─── Attendance ──────────────────────────────────────────────────────────────

/// Projection of one participant's attendance record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantAttendance {
    pub participant_id: i64,
    pub event_id: i64,
    pub user_id: Option<i64>,
    pub participation_status: ParticipationStatus,
    pub attendance_status: AttendanceStatus,
    pub marked_at: Option<DateTime<Utc>>,
    pub marked_by: Option<i64>,
    pub notes: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Kind of change an audit row records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CheckIn,
    Correction,
    MarkAbsent,
    FinalizeAttended,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckIn => "check_in",
            Self::Correction => "correction",
            Self::MarkAbsent => "mark_absent",
            Self::FinalizeAttended => "finalize_attended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "check_in" => Some(Self::CheckIn),
            "correction" => Some(Self::Correction),
            "mark_absent" => Some(Self::MarkAbsent),
            "finalize_attended" => Some(Self::FinalizeAttended),
            _ => None,
        }
    }
}

/// One append-only attendance audit row. `previous_status` and `new_status`
/// hold attendance statuses, or participation statuses for finalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceAuditEntry {
    pub audit_id: i64,
    pub event_id: i64,
    pub participant_id: i64,
    pub user_id: Option<i64>,
    pub marked_by: Option<i64>,
    pub action: AuditAction,
    pub previous_status: Option<String>,
    pub new_status: String,
    pub reason: Option<String>,
    pub performed_at: DateTime<Utc>,
}

/// Filters for reading the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub participant_id: Option<i64>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub scanned: u64,
    pub flagged: u64,
}

/// Result of sweeping unresolved attendance to absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbsenceSweep {
    pub scanned: u64,
    pub flagged: u64,
    pub batches: Vec<BatchSummary>,
}

impl AbsenceSweep {
    pub fn record(&mut self, batch: BatchSummary) {
        self.scanned += batch.scanned;
        self.flagged += batch.flagged;
        self.batches.push(batch);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalizedParticipant {
    pub participant_id: i64,
    pub user_id: Option<i64>,
}

// ─── Rewards ─────────────────────────────────────────────────────────────────

/// Input to `award_action`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwardRequest {
    pub user_id: i64,
    pub action: GamificationAction,
    #[serde(default)]
    pub event_id: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub dedupe_suffix: Option<String>,
    #[serde(default)]
    pub points_override: Option<i64>,
    /// Role of the user receiving the points; selects role-scoped
    /// achievement mappings.
    #[serde(default)]
    pub recipient_role: Option<Role>,
}

impl AwardRequest {
    pub fn new(user_id: i64, action: GamificationAction) -> Self {
        Self {
            user_id,
            action,
            event_id: None,
            metadata: None,
            dedupe_suffix: None,
            points_override: None,
            recipient_role: None,
        }
    }

    pub fn role(mut self, role: Role) -> Self {
        self.recipient_role = Some(role);
        self
    }

    pub fn event(mut self, event_id: i64) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.dedupe_suffix = Some(suffix.into());
        self
    }

    pub fn points(mut self, points: i64) -> Self {
        self.points_override = Some(points);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantedBadge {
    pub achievement_id: i64,
    pub badge_code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<BadgeLevel>,
    pub bonus_points: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelChange {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwardOutcome {
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    pub dedupe_key: String,
    pub points_delta: i64,
    pub newly_granted_badges: Vec<GrantedBadge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_up: Option<LevelChange>,
}

impl AwardOutcome {
    pub fn duplicate(dedupe_key: String) -> Self {
        Self {
            skipped: true,
            reason: Some(SkipReason::Duplicate),
            dedupe_key,
            points_delta: 0,
            newly_granted_badges: Vec::new(),
            level_up: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub event_id: Option<i64>,
    pub action: GamificationAction,
    pub points_delta: i64,
    pub metadata: Option<serde_json::Value>,
    pub dedupe_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EarnedBadge {
    pub achievement_id: i64,
    pub badge_code: String,
    pub name: String,
    pub badge_level: Option<BadgeLevel>,
    pub earned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AchievementProgress {
    pub achievement_code: String,
    pub current_count: i64,
    pub badge_level: BadgeLevel,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAchievementsView {
    pub progress: Vec<AchievementProgress>,
    pub earned: Vec<EarnedBadge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GamificationSummary {
    pub stats: UserGamificationStats,
    pub badges: Vec<EarnedBadge>,
    pub recent_events: Vec<LedgerEntry>,
    pub level: LevelProgress,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardPeriod {
    #[default]
    All,
    /// Points earned over the last 30 days.
    Monthly,
}

impl std::str::FromStr for LeaderboardPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown leaderboard period '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: i64,
    pub points: i64,
    pub level: i64,
}

// ─── Achievement mappings ────────────────────────────────────────────────────

/// Request to grant an achievement whenever a matching award happens.
///
/// `event_id` pins the mapping to one event, `event_type` to every event of
/// that type; with neither it applies to any award of the trigger action.
/// `None` for `trigger_action` or `target_role` matches any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAchievementMapping {
    pub badge_code: String,
    #[serde(default)]
    pub event_id: Option<i64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub trigger_action: Option<GamificationAction>,
    #[serde(default)]
    pub target_role: Option<Role>,
    #[serde(default)]
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AchievementMapping {
    pub mapping_id: i64,
    pub achievement_id: i64,
    pub badge_code: String,
    pub event_id: Option<i64>,
    pub event_type: Option<String>,
    pub trigger_action: Option<GamificationAction>,
    pub target_role: Option<Role>,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventFailure {
    pub event_id: i64,
    pub stage: String,
    pub error: String,
}

/// What one completion pass did.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerReport {
    pub job_id: String,
    pub started: Vec<i64>,
    pub completed: Vec<i64>,
    pub absences_flagged: u64,
    pub failures: Vec<EventFailure>,
}
