//! The public operation surface.
//!
//! [`Engine`] checks the actor's role, runs each operation in one
//! transaction, then publishes the resulting domain events. Reward reactions
//! to those events (attendance points, achievement progress) run afterwards
//! in their own transactions, so a failing reaction never undoes the
//! operation that triggered it.

use chrono::{DateTime, Utc};
use rollcall_api::{
    AbsenceSweep, AchievementMapping, Actor, AttendanceAuditEntry, AuditQuery, AwardOutcome,
    AwardRequest, EventFailure, EventInfo, FinalizedParticipant, GamificationSummary,
    LeaderboardEntry, LeaderboardPeriod, NewAchievementMapping, NewEventRequest,
    ParticipantAttendance, Role, SchedulerReport, UserAchievementsView,
};
use rollcall_core::{
    Clock, DomainEvent, EventStatus, GamificationAction, LevelTable, LevelThreshold,
    ParticipationStatus, SystemClock,
};
use rollcall_runtime_config::RollcallConfig;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::attendance::{self, WindowDefaults};
use crate::badges::{self, BadgeEvaluator, ProgressChange};
use crate::bus::EventBus;
use crate::completion;
use crate::error::{Result, StoreError};
use crate::events;
use crate::ledger;
use crate::reconcile;
use crate::rewards::{self, RewardContext};
use crate::settings::{ConfigSettings, SettingsProvider};
use crate::Db;

/// Tunables taken from `rollcall.toml`.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub window: WindowDefaults,
    pub absence_batch_size: u32,
    pub audit_default_limit: u32,
    pub streak_window_hours: i64,
    /// Recipient role for attendance awards, used to match achievement
    /// mappings.
    pub attendee_role: Option<Role>,
    /// Overrides the stored level table when set.
    pub levels: Option<LevelTable>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            window: WindowDefaults::default(),
            absence_batch_size: 500,
            audit_default_limit: 100,
            streak_window_hours: rollcall_core::rules::DEFAULT_STREAK_WINDOW_HOURS,
            attendee_role: Some(Role::Volunteer),
            levels: None,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &RollcallConfig) -> Result<Self> {
        let levels = if config.gamification.levels.is_empty() {
            None
        } else {
            Some(LevelTable::new(
                config
                    .gamification
                    .levels
                    .iter()
                    .map(|l| LevelThreshold {
                        level: l.level,
                        points_cumulative: l.points_cumulative,
                        reward_title: l.reward_title.clone(),
                    })
                    .collect(),
            )?)
        };
        Ok(Self {
            window: WindowDefaults {
                checkin_window_mins: config.attendance.default_checkin_window_mins,
                grace_mins: config.attendance.default_grace_mins,
            },
            absence_batch_size: config.attendance.absence_batch_size,
            audit_default_limit: config.attendance.audit_default_limit,
            streak_window_hours: config.gamification.streak_window_hours,
            attendee_role: Some(
                config
                    .gamification
                    .attendee_role
                    .parse::<Role>()
                    .map_err(StoreError::validation)?,
            ),
            levels,
        })
    }
}

pub struct Engine {
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsProvider>,
    bus: EventBus,
    options: EngineOptions,
}

impl Engine {
    pub fn new(db: Arc<Db>, options: EngineOptions) -> Self {
        Self {
            db,
            clock: Arc::new(SystemClock),
            settings: Arc::new(ConfigSettings::new(&Default::default())),
            bus: EventBus::new(),
            options,
        }
    }

    /// Engine wired entirely from a loaded config file.
    pub fn from_config(db: Arc<Db>, config: &RollcallConfig) -> Result<Self> {
        Ok(Self::new(db, EngineOptions::from_config(config)?)
            .with_settings(Arc::new(ConfigSettings::new(&config.gamification))))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn badges(&self) -> BadgeEvaluator {
        BadgeEvaluator::new(self.settings.badges_enabled())
    }

    fn levels(&self, conn: &Connection) -> Result<LevelTable> {
        ledger::level_table(conn, self.options.levels.as_ref())
    }

    fn reward_context<'a>(&'a self, levels: &'a LevelTable) -> RewardContext<'a> {
        RewardContext {
            settings: self.settings.as_ref(),
            levels,
            streak_window_hours: self.options.streak_window_hours,
            badges: self.badges(),
        }
    }

    // ── Seeding ─────────────────────────────────────────────────────────

    pub fn create_event(&self, actor: &Actor, request: &NewEventRequest) -> Result<EventInfo> {
        require_manager(actor, "create events")?;
        let event = self.db.with_tx(|tx| events::insert(tx, request))?;
        info!(event_id = event.event_id, uid = %event.uid, "Event created");
        Ok(event)
    }

    pub fn register(
        &self,
        actor: &Actor,
        event_id: i64,
        user_id: Option<i64>,
        status: ParticipationStatus,
    ) -> Result<ParticipantAttendance> {
        require_manager(actor, "register participants")?;
        let now = self.now();
        self.db
            .with_tx(|tx| events::register(tx, event_id, user_id, status, now))
    }

    pub fn event(&self, event_id: i64) -> Result<EventInfo> {
        self.db.with_conn(|conn| events::require(conn, event_id))
    }

    pub fn participants(&self, event_id: i64) -> Result<Vec<ParticipantAttendance>> {
        self.db.with_conn(|conn| {
            events::require(conn, event_id)?;
            events::participants(conn, event_id)
        })
    }

    // ── Attendance ──────────────────────────────────────────────────────

    pub fn check_in(
        &self,
        actor: &Actor,
        event_id: i64,
        participant_id: i64,
    ) -> Result<ParticipantAttendance> {
        require_manager(actor, "check in participants")?;
        let now = self.now();
        let window = self.options.window;
        let outcome = self.db.with_tx(|tx| {
            attendance::check_in(tx, event_id, participant_id, actor.user_id, now, window)
        })?;
        if outcome.recorded {
            info!(
                event_id,
                participant_id,
                status = outcome.record.attendance_status.as_str(),
                "Checked in"
            );
            self.dispatch(vec![DomainEvent::ParticipantCheckedIn {
                event_id,
                participant_id,
                user_id: outcome.record.user_id,
                status: outcome.record.attendance_status,
                marked_by: actor.user_id,
                at: now,
            }]);
        }
        Ok(outcome.record)
    }

    pub fn patch_attendance(
        &self,
        actor: &Actor,
        event_id: i64,
        participant_id: i64,
        status: &str,
        reason: Option<&str>,
    ) -> Result<ParticipantAttendance> {
        require_manager(actor, "correct attendance")?;
        let now = self.now();
        let correction = self.db.with_tx(|tx| {
            attendance::patch_attendance(
                tx,
                event_id,
                participant_id,
                status,
                actor.user_id,
                reason,
                now,
            )
        })?;
        if correction.changed {
            info!(
                event_id,
                participant_id,
                from = correction.previous.as_str(),
                to = correction.record.attendance_status.as_str(),
                "Attendance corrected"
            );
            self.dispatch(vec![DomainEvent::AttendanceCorrected {
                event_id,
                participant_id,
                user_id: correction.record.user_id,
                previous: correction.previous,
                status: correction.record.attendance_status,
                marked_by: actor.user_id,
                reason: reason.map(str::to_string),
            }]);
        }
        Ok(correction.record)
    }

    pub fn get_attendance_audit(
        &self,
        actor: &Actor,
        event_id: i64,
        query: &AuditQuery,
    ) -> Result<Vec<AttendanceAuditEntry>> {
        require_manager(actor, "read attendance audit")?;
        let default_limit = self.options.audit_default_limit;
        self.db.with_conn(|conn| {
            attendance::get_attendance_audit(conn, event_id, query, default_limit)
        })
    }

    pub fn auto_flag_absences(&self, actor: &Actor, event_id: i64) -> Result<AbsenceSweep> {
        require_manager(actor, "flag absences")?;
        let sweep = reconcile::auto_flag_absences(
            &self.db,
            event_id,
            self.now(),
            self.options.absence_batch_size,
        )?;
        if sweep.flagged > 0 {
            self.dispatch(vec![DomainEvent::AbsencesFlagged {
                event_id,
                flagged: sweep.flagged,
            }]);
        }
        Ok(sweep)
    }

    /// Promote checked-in participants to `attended`; each one then earns
    /// `EVENT_ATTEND` points.
    pub fn finalize_attended_participants(
        &self,
        actor: &Actor,
        event_id: i64,
    ) -> Result<Vec<FinalizedParticipant>> {
        require_manager(actor, "finalize attendance")?;
        let now = self.now();
        let finalized = self
            .db
            .with_tx(|tx| attendance::finalize_attended_participants(tx, event_id, now))?;
        self.dispatch(attended_events(event_id, &finalized));
        Ok(finalized)
    }

    // ── Rewards ─────────────────────────────────────────────────────────

    pub fn award_action(&self, actor: &Actor, request: &AwardRequest) -> Result<AwardOutcome> {
        require_self_or_manager(actor, request.user_id, "award points to other users")?;
        let now = self.now();
        let mut emitted = Vec::new();
        let outcome = self.db.with_tx(|tx| {
            let levels = self.levels(tx)?;
            let ctx = self.reward_context(&levels);
            rewards::award_action(tx, &ctx, request, now, &mut emitted)
        })?;
        if !outcome.skipped {
            info!(
                user_id = request.user_id,
                action = request.action.as_str(),
                points = outcome.points_delta,
                "Points awarded"
            );
        }
        self.dispatch(emitted);
        Ok(outcome)
    }

    pub fn record_ocr_approval(
        &self,
        actor: &Actor,
        user_id: i64,
        submission_id: &str,
    ) -> Result<Option<ProgressChange>> {
        require_manager(actor, "approve submissions")?;
        let now = self.now();
        let mut emitted = Vec::new();
        let change = self.db.with_tx(|tx| {
            let levels = self.levels(tx)?;
            let ctx = self.reward_context(&levels);
            completion::record_ocr_approval(tx, &ctx, user_id, submission_id, now, &mut emitted)
        })?;
        self.dispatch(emitted);
        Ok(change)
    }

    pub fn recalculate_user(
        &self,
        actor: &Actor,
        user_id: i64,
    ) -> Result<rollcall_core::UserGamificationStats> {
        require_manager(actor, "recalculate stats")?;
        let now = self.now();
        self.db.with_tx(|tx| {
            let levels = self.levels(tx)?;
            ledger::recalculate_user(tx, user_id, &levels, now)
        })
    }

    // ── Achievement mappings ────────────────────────────────────────────

    pub fn create_achievement_mapping(
        &self,
        actor: &Actor,
        request: &NewAchievementMapping,
    ) -> Result<AchievementMapping> {
        require_admin(actor, "configure achievement mappings")?;
        let mut request = request.clone();
        request.created_by = request.created_by.or(actor.user_id);
        let now = self.now();
        self.db
            .with_tx(|tx| badges::create_mapping(tx, &request, now))
    }

    pub fn set_achievement_mapping_active(
        &self,
        actor: &Actor,
        mapping_id: i64,
        active: bool,
    ) -> Result<AchievementMapping> {
        require_admin(actor, "configure achievement mappings")?;
        self.db
            .with_tx(|tx| badges::set_mapping_active(tx, mapping_id, active))
    }

    pub fn achievement_mappings(
        &self,
        actor: &Actor,
        active_only: bool,
    ) -> Result<Vec<AchievementMapping>> {
        require_manager(actor, "view achievement mappings")?;
        self.db
            .with_conn(|conn| badges::list_mappings(conn, active_only))
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn summary(&self, actor: &Actor, user_id: i64) -> Result<GamificationSummary> {
        require_self_or_manager(actor, user_id, "view other users' rewards")?;
        self.db.with_conn(|conn| {
            let stats = ledger::load_stats(conn, user_id)?
                .unwrap_or_else(|| rollcall_core::UserGamificationStats::new(user_id));
            let level = self.levels(conn)?.resolve(stats.lifetime_points);
            Ok(GamificationSummary {
                badges: badges::earned_badges(conn, user_id)?,
                recent_events: ledger::recent(conn, user_id, ledger::RECENT_ENTRIES)?,
                level,
                stats,
            })
        })
    }

    pub fn user_achievements(&self, actor: &Actor, user_id: i64) -> Result<UserAchievementsView> {
        require_self_or_manager(actor, user_id, "view other users' achievements")?;
        self.db.with_conn(|conn| {
            Ok(UserAchievementsView {
                progress: badges::progress_for_user(conn, user_id)?,
                earned: badges::earned_badges(conn, user_id)?,
            })
        })
    }

    pub fn leaderboard(
        &self,
        actor: &Actor,
        period: LeaderboardPeriod,
        limit: u32,
    ) -> Result<Vec<LeaderboardEntry>> {
        debug!(role = %actor.role, ?period, limit, "Leaderboard requested");
        let now = self.now();
        self.db
            .with_conn(|conn| ledger::leaderboard(conn, period, limit, now))
    }

    pub fn level_thresholds(&self, actor: &Actor) -> Result<Vec<LevelThreshold>> {
        debug!(role = %actor.role, "Level thresholds requested");
        self.db
            .with_conn(|conn| Ok(self.levels(conn)?.thresholds().to_vec()))
    }

    // ── Scheduler ───────────────────────────────────────────────────────

    /// Start due events, complete ended ones, then finalize attendance, flag
    /// absences, and process achievements for each completed event. Each
    /// event is handled on its own; a failure is logged and recorded in the
    /// report without stopping the pass.
    pub fn run_scheduled_pass(&self, now: DateTime<Utc>) -> Result<SchedulerReport> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let mut report = SchedulerReport {
            job_id: job_id.clone(),
            ..SchedulerReport::default()
        };

        let due = self.db.with_conn(|conn| events::due_to_start(conn, now))?;
        for event in due {
            let started = self.db.with_tx(|tx| {
                events::transition_status(
                    tx,
                    event.event_id,
                    &[EventStatus::Published],
                    EventStatus::Ongoing,
                    now,
                )
            });
            match started {
                Ok(true) => {
                    info!(event_id = event.event_id, "Event started");
                    report.started.push(event.event_id);
                }
                Ok(false) => {}
                Err(e) => record_failure(&mut report, event.event_id, "start", &e),
            }
        }

        let ended = self.db.with_conn(|conn| events::due_to_complete(conn, now))?;
        for event in ended {
            match self.complete_event(&event, &job_id, now) {
                Ok(Some(flagged)) => {
                    report.completed.push(event.event_id);
                    report.absences_flagged += flagged;
                }
                Ok(None) => {}
                Err((stage, e)) => record_failure(&mut report, event.event_id, stage, &e),
            }
        }

        info!(
            job_id = %report.job_id,
            started = report.started.len(),
            completed = report.completed.len(),
            failures = report.failures.len(),
            "Scheduled pass finished"
        );
        Ok(report)
    }

    /// Returns the number of absences flagged, or `None` if another writer
    /// already completed the event.
    fn complete_event(
        &self,
        event: &EventInfo,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<Option<u64>, (&'static str, StoreError)> {
        let event_id = event.event_id;
        let finalized = self
            .db
            .with_tx(|tx| {
                let moved = events::transition_status(
                    tx,
                    event_id,
                    &EventStatus::COMPLETABLE,
                    EventStatus::Completed,
                    now,
                )?;
                if !moved {
                    return Ok(None);
                }
                attendance::finalize_attended_participants(tx, event_id, now).map(Some)
            })
            .map_err(|e| ("complete", e))?;
        let Some(finalized) = finalized else {
            return Ok(None);
        };
        info!(event_id, finalized = finalized.len(), "Event completed");

        let sweep = reconcile::auto_flag_absences(
            &self.db,
            event_id,
            now,
            self.options.absence_batch_size,
        )
        .map_err(|e| ("flag_absences", e))?;

        let mut emitted = attended_events(event_id, &finalized);
        if sweep.flagged > 0 {
            emitted.push(DomainEvent::AbsencesFlagged {
                event_id,
                flagged: sweep.flagged,
            });
        }
        emitted.push(DomainEvent::EventCompleted {
            event_id,
            job_id: job_id.to_string(),
        });
        self.dispatch(emitted);
        Ok(Some(sweep.flagged))
    }

    // ── Event dispatch ──────────────────────────────────────────────────

    /// Publish events to the bus and run the engine's own reactions. Events
    /// produced by a reaction are published in turn.
    fn dispatch(&self, events: Vec<DomainEvent>) {
        let mut queue: VecDeque<DomainEvent> = events.into();
        while let Some(event) = queue.pop_front() {
            self.bus.publish(&event);
            match self.react(&event) {
                Ok(more) => queue.extend(more),
                Err(e) => warn!(
                    event = event.name(),
                    kind = e.kind(),
                    "Reaction to domain event failed: {e}"
                ),
            }
        }
    }

    fn react(&self, event: &DomainEvent) -> Result<Vec<DomainEvent>> {
        let mut emitted = Vec::new();
        match event {
            DomainEvent::ParticipantAttended {
                event_id, user_id, ..
            } => {
                let mut request = AwardRequest::new(*user_id, GamificationAction::EventAttend)
                    .event(*event_id)
                    .suffix(format!("attendance-{user_id}"));
                request.recipient_role = self.options.attendee_role;
                let now = self.now();
                self.db.with_tx(|tx| {
                    let levels = self.levels(tx)?;
                    let ctx = self.reward_context(&levels);
                    rewards::award_action(tx, &ctx, &request, now, &mut emitted)
                })?;
            }
            DomainEvent::EventCompleted { event_id, job_id } => {
                let now = self.now();
                let report = self.db.with_tx(|tx| {
                    let levels = self.levels(tx)?;
                    let ctx = self.reward_context(&levels);
                    completion::process_event_completed(tx, &ctx, *event_id, job_id, now, &mut emitted)
                })?;
                debug!(event_id, ?report, "Achievement progress processed");
            }
            _ => {}
        }
        Ok(emitted)
    }
}

fn attended_events(event_id: i64, finalized: &[FinalizedParticipant]) -> Vec<DomainEvent> {
    finalized
        .iter()
        .filter_map(|p| {
            p.user_id.map(|user_id| DomainEvent::ParticipantAttended {
                event_id,
                participant_id: p.participant_id,
                user_id,
            })
        })
        .collect()
}

fn record_failure(report: &mut SchedulerReport, event_id: i64, stage: &str, e: &StoreError) {
    error!(event_id, stage, kind = e.kind(), "Scheduled pass failed for event: {e}");
    report.failures.push(EventFailure {
        event_id,
        stage: stage.to_string(),
        error: e.to_string(),
    });
}

// ─── Role guards ────────────────────────────────────────────────────────────

fn require_manager(actor: &Actor, what: &str) -> Result<()> {
    if actor.role.can_manage_attendance() {
        Ok(())
    } else {
        Err(StoreError::forbidden(format!(
            "Role {} may not {what}",
            actor.role
        )))
    }
}

fn require_admin(actor: &Actor, what: &str) -> Result<()> {
    if matches!(actor.role, Role::Admin | Role::System) {
        Ok(())
    } else {
        Err(StoreError::forbidden(format!(
            "Role {} may not {what}",
            actor.role
        )))
    }
}

fn require_self_or_manager(actor: &Actor, user_id: i64, what: &str) -> Result<()> {
    if actor.user_id == Some(user_id) {
        return Ok(());
    }
    require_manager(actor, what)
}
