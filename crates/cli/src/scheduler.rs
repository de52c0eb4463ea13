use anyhow::Result;
use rollcall_api::SchedulerReport;
use rollcall_store::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Run one completion pass on the blocking pool.
pub async fn run_pass(engine: &Arc<Engine>) -> Result<SchedulerReport> {
    let engine = Arc::clone(engine);
    let report = tokio::task::spawn_blocking(move || {
        let now = engine.now();
        engine.run_scheduled_pass(now)
    })
    .await??;
    Ok(report)
}

/// Run passes every `interval_secs` until `shutdown` flips to true.
pub async fn run_scheduler(
    engine: Arc<Engine>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    info!(interval_secs, "Scheduler started");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                match run_pass(&engine).await {
                    Ok(report) if !report.completed.is_empty() || !report.failures.is_empty() => {
                        info!(
                            job_id = %report.job_id,
                            completed = report.completed.len(),
                            failures = report.failures.len(),
                            "Pass finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!("Scheduled pass failed: {e:#}"),
                }
            }

            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT.
pub async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use rollcall_api::{Actor, NewEventRequest};
    use rollcall_core::EventStatus;
    use rollcall_store::{Db, EngineOptions};

    fn engine_with_ended_event() -> (Arc<Engine>, i64) {
        let engine = Engine::new(
            Arc::new(Db::open_in_memory().unwrap()),
            EngineOptions::default(),
        );
        let start = Utc::now() - ChronoDuration::hours(3);
        let event = engine
            .create_event(
                &Actor::system(),
                &NewEventRequest {
                    uid: "past".into(),
                    title: "Past meetup".into(),
                    event_type: None,
                    status: EventStatus::Published,
                    start_at: start,
                    end_at: start + ChronoDuration::hours(2),
                    checkin_window_mins: None,
                    grace_mins: None,
                    created_by: None,
                },
            )
            .unwrap();
        (Arc::new(engine), event.event_id)
    }

    #[tokio::test]
    async fn single_pass_completes_ended_events() {
        let (engine, event_id) = engine_with_ended_event();
        let report = run_pass(&engine).await.unwrap();
        assert_eq!(report.completed, vec![event_id]);
        assert_eq!(engine.event(event_id).unwrap().status, EventStatus::Completed);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let (engine, event_id) = engine_with_ended_event();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(Arc::clone(&engine), 1, rx));

        // The first tick fires immediately.
        for _ in 0..50 {
            if engine.event(event_id).unwrap().status == EventStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(engine.event(event_id).unwrap().status, EventStatus::Completed);
    }
}
