//! SQLite-backed attendance and rewards engine.
//!
//! Every store function takes an explicit `&Connection` (usually a
//! transaction) as its unit of work. [`Engine`] owns the [`Db`] and composes
//! those functions into the public operations.

pub mod attendance;
pub mod badges;
pub mod bus;
pub mod completion;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod reconcile;
pub mod rewards;
pub mod settings;
pub mod sql;

use rollcall_api::db::migrations::MIGRATIONS;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use bus::{DomainEventHandler, EventBus, TracingHandler};
pub use engine::{Engine, EngineOptions};
pub use error::{Result, StoreError};
pub use settings::{ConfigSettings, MapSettings, SettingsProvider};

/// Thread-safe SQLite handle: wraps the connection in a Mutex so it can be
/// shared via `Arc<Db>`.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// A panic inside `with_tx` drops its transaction, which rolls back, so a
    /// poisoned lock still guards a consistent connection.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `work` inside an IMMEDIATE transaction. The write lock is taken
    /// up front; any error rolls every write back.
    pub fn with_tx<T>(&self, work: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = work(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run read-only `work` against the connection.
    pub fn with_conn<T>(&self, work: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn();
        work(&conn)
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;

        if !already_applied {
            conn.execute_batch(sql)
                .map_err(|source| StoreError::Migration {
                    name: name.to_string(),
                    source,
                })?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Db;
    use rollcall_api::NewEventRequest;
    use rollcall_core::EventStatus;
    use rollcall_core::testing::{event_start, minutes_from_start};

    pub fn test_db() -> Db {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.keep().join("test.db");
        Db::open_path(&path).unwrap()
    }

    /// A published two-hour meetup starting at `event_start()`.
    pub fn sample_event(uid: &str) -> NewEventRequest {
        NewEventRequest {
            uid: uid.to_string(),
            title: "Spring meetup".to_string(),
            event_type: Some("meetup".to_string()),
            status: EventStatus::Published,
            start_at: event_start(),
            end_at: minutes_from_start(120),
            checkin_window_mins: None,
            grace_mins: None,
            created_by: Some(1),
        }
    }
}
