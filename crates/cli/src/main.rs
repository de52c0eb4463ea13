mod commands;
mod config;
mod output;
mod scheduler;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rollcall_api::{Actor, LeaderboardPeriod, Role};
use rollcall_core::{EventStatus, GamificationAction, ParticipationStatus};
use rollcall_store::{Db, Engine, EventBus, StoreError, TracingHandler};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::output::CliDiagnostic;

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall - event check-in, attendance audit, and rewards")]
struct Cli {
    /// Path to rollcall.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides [database].path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// User id of the caller
    #[arg(long = "as", global = true)]
    user: Option<i64>,

    /// Role of the caller
    #[arg(long, global = true, default_value = "admin")]
    role: Role,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and inspect events
    Event {
        #[command(subcommand)]
        action: EventAction,
    },

    /// Register a user for an event
    Register {
        event_id: i64,
        user_id: i64,
        #[arg(long, default_value = "registered")]
        status: ParticipationStatus,
    },

    /// Check a participant in; the time decides present or late
    CheckIn { event_id: i64, participant_id: i64 },

    /// Correct a participant's attendance status
    Patch {
        event_id: i64,
        participant_id: i64,
        /// present, late, absent, or unknown
        status: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Mark unresolved participants of a finished event absent
    FlagAbsences { event_id: i64 },

    /// Promote checked-in participants to attended
    Finalize { event_id: i64 },

    /// Show the attendance audit trail, newest first
    Audit {
        event_id: i64,
        #[arg(long)]
        participant: Option<i64>,
        #[arg(long)]
        limit: Option<u32>,
        /// Only entries strictly before this RFC 3339 time
        #[arg(long)]
        before: Option<DateTime<Utc>>,
    },

    /// Award points for an action
    Award {
        user_id: i64,
        action: GamificationAction,
        #[arg(long)]
        event: Option<i64>,
        #[arg(long)]
        suffix: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        points: Option<i64>,
        /// JSON object stored with the ledger entry
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Record an approved OCR submission
    OcrApprove { user_id: i64, submission_id: String },

    /// Points, level, badges, and recent ledger entries for a user
    Summary { user_id: i64 },

    /// Named-achievement progress for a user
    Achievements { user_id: i64 },

    /// Top users by points
    Leaderboard {
        #[arg(long, default_value = "all")]
        period: LeaderboardPeriod,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// Configure achievements granted by matching awards
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Show the level table
    Levels,

    /// Rebuild a user's stats from the ledger
    Recalc { user_id: i64 },

    /// Run the completion scheduler
    Scheduler {
        #[command(subcommand)]
        action: SchedulerAction,
    },

    /// Show the effective configuration
    Config,
}

#[derive(Subcommand)]
enum EventAction {
    /// Create an event
    Add {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        title: String,
        #[arg(long = "type")]
        event_type: Option<String>,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long, default_value = "published")]
        status: EventStatus,
        #[arg(long)]
        window: Option<i64>,
        #[arg(long)]
        grace: Option<i64>,
    },
    /// Show one event and its participants
    Show { event_id: i64 },
}

#[derive(Subcommand)]
enum MappingAction {
    /// Map an achievement to an action
    Add {
        badge_code: String,
        /// Only awards for this event
        #[arg(long)]
        event: Option<i64>,
        /// Only awards for events of this type
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Triggering action; any action when omitted
        #[arg(long)]
        trigger: Option<GamificationAction>,
        /// Recipient role; any role when omitted
        #[arg(long = "for-role")]
        target_role: Option<Role>,
    },
    /// List mappings
    List {
        #[arg(long)]
        all: bool,
    },
    /// Stop a mapping from granting
    Disable { mapping_id: i64 },
    /// Re-enable a disabled mapping
    Enable { mapping_id: i64 },
}

#[derive(Subcommand)]
enum SchedulerAction {
    /// Run a single pass and exit
    Once,
    /// Run passes on the configured interval until interrupted
    Run {
        /// Seconds between passes (overrides [scheduler].interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rollcall=info".parse().unwrap())
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        if let Some(store) = e.downcast_ref::<StoreError>() {
            if let Ok(json) = serde_json::to_string_pretty(&CliDiagnostic::from_store(store)) {
                println!("{json}");
            }
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config(cli.config.as_deref())?;
    if let Commands::Config = cli.command {
        return config::show_config(&cfg);
    }

    let db_path = config::resolve_db_path(&cfg, cli.db.as_deref());
    let db = Arc::new(Db::open_path(&db_path)?);
    let mut bus = EventBus::new();
    bus.register(TracingHandler);
    let engine = Arc::new(Engine::from_config(db, &cfg)?.with_bus(bus));
    let actor = Actor {
        user_id: cli.user,
        role: cli.role,
    };

    match cli.command {
        Commands::Event { action } => match action {
            EventAction::Add {
                uid,
                title,
                event_type,
                start,
                end,
                status,
                window,
                grace,
            } => commands::add_event(
                &engine,
                &actor,
                rollcall_api::NewEventRequest {
                    uid,
                    title,
                    event_type,
                    status,
                    start_at: start,
                    end_at: end,
                    checkin_window_mins: window,
                    grace_mins: grace,
                    created_by: actor.user_id,
                },
            ),
            EventAction::Show { event_id } => commands::show_event(&engine, event_id),
        },
        Commands::Register {
            event_id,
            user_id,
            status,
        } => commands::register(&engine, &actor, event_id, user_id, status),
        Commands::CheckIn {
            event_id,
            participant_id,
        } => commands::check_in(&engine, &actor, event_id, participant_id),
        Commands::Patch {
            event_id,
            participant_id,
            status,
            reason,
        } => commands::patch(
            &engine,
            &actor,
            event_id,
            participant_id,
            &status,
            reason.as_deref(),
        ),
        Commands::FlagAbsences { event_id } => commands::flag_absences(&engine, &actor, event_id),
        Commands::Finalize { event_id } => commands::finalize(&engine, &actor, event_id),
        Commands::Audit {
            event_id,
            participant,
            limit,
            before,
        } => commands::audit(
            &engine,
            &actor,
            event_id,
            rollcall_api::AuditQuery {
                participant_id: participant,
                limit,
                before,
            },
        ),
        Commands::Award {
            user_id,
            action,
            event,
            suffix,
            points,
            metadata,
        } => commands::award(
            &engine,
            &actor,
            commands::AwardArgs {
                user_id,
                action,
                event,
                suffix,
                points,
                metadata,
            },
        ),
        Commands::OcrApprove {
            user_id,
            submission_id,
        } => commands::ocr_approve(&engine, &actor, user_id, &submission_id),
        Commands::Summary { user_id } => commands::summary(&engine, &actor, user_id),
        Commands::Achievements { user_id } => commands::achievements(&engine, &actor, user_id),
        Commands::Leaderboard { period, limit } => {
            commands::leaderboard(&engine, &actor, period, limit)
        }
        Commands::Mapping { action } => match action {
            MappingAction::Add {
                badge_code,
                event,
                event_type,
                trigger,
                target_role,
            } => commands::add_mapping(
                &engine,
                &actor,
                rollcall_api::NewAchievementMapping {
                    badge_code,
                    event_id: event,
                    event_type,
                    trigger_action: trigger,
                    target_role,
                    created_by: actor.user_id,
                },
            ),
            MappingAction::List { all } => commands::list_mappings(&engine, &actor, !all),
            MappingAction::Disable { mapping_id } => {
                commands::set_mapping_active(&engine, &actor, mapping_id, false)
            }
            MappingAction::Enable { mapping_id } => {
                commands::set_mapping_active(&engine, &actor, mapping_id, true)
            }
        },
        Commands::Levels => commands::levels(&engine, &actor),
        Commands::Recalc { user_id } => commands::recalc(&engine, &actor, user_id),
        Commands::Scheduler { action } => match action {
            SchedulerAction::Once => {
                let report = scheduler::run_pass(&engine).await?;
                output::emit("scheduler_report", "Scheduled pass finished", &report)
            }
            SchedulerAction::Run { interval } => {
                let interval = interval.unwrap_or(cfg.scheduler.interval_secs);
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let handle = tokio::spawn(scheduler::run_scheduler(
                    Arc::clone(&engine),
                    interval,
                    shutdown_rx,
                ));
                scheduler::wait_for_shutdown().await?;
                info!("Shutdown signal received, stopping...");
                let _ = shutdown_tx.send(true);
                handle.await?;
                Ok(())
            }
        },
        Commands::Config => config::show_config(&cfg),
    }
}
