//! Shared database schema, migrations, and query builders.
//!
//! Every builder returns `(sql, values)` for the SQLite backend.

pub mod achievements;
pub mod attendance_audit;
pub mod events;
pub mod ledger;
pub mod levels;
pub mod migrations;
pub mod participants;
pub mod stats;
pub mod tables;

// Re-export tables for convenience
pub use tables::*;
