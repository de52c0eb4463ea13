//! Shared runtime configuration types.
//!
//! The CLI and scheduler read `rollcall.toml` into [`RollcallConfig`]. Every
//! field has a default so a missing or partial file is valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "rollcall.toml";

/// Top-level configuration (persisted as `rollcall.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RollcallConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub attendance: AttendanceSettings,
    #[serde(default)]
    pub gamification: GamificationSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceSettings {
    /// Minutes before start when check-in opens, unless the event overrides it.
    #[serde(default = "default_checkin_window_mins")]
    pub default_checkin_window_mins: i64,
    /// Minutes after start that still count as on time.
    #[serde(default = "default_grace_mins")]
    pub default_grace_mins: i64,
    #[serde(default = "default_absence_batch_size")]
    pub absence_batch_size: u32,
    #[serde(default = "default_audit_limit")]
    pub audit_default_limit: u32,
}

impl Default for AttendanceSettings {
    fn default() -> Self {
        Self {
            default_checkin_window_mins: default_checkin_window_mins(),
            default_grace_mins: default_grace_mins(),
            absence_batch_size: default_absence_batch_size(),
            audit_default_limit: default_audit_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GamificationSettings {
    #[serde(default = "default_true")]
    pub enable_badges: bool,
    #[serde(default = "default_streak_window_hours")]
    pub streak_window_hours: i64,
    /// Role attendance awards are made under when matching achievement
    /// mappings.
    #[serde(default = "default_attendee_role")]
    pub attendee_role: String,
    /// Point overrides keyed by action name, e.g. `EVENT_ATTEND = 50`.
    #[serde(default)]
    pub points: BTreeMap<String, i64>,
    /// Level table override. Empty means the table stored in the database.
    #[serde(default)]
    pub levels: Vec<LevelSetting>,
}

impl Default for GamificationSettings {
    fn default() -> Self {
        Self {
            enable_badges: true,
            streak_window_hours: default_streak_window_hours(),
            attendee_role: default_attendee_role(),
            points: BTreeMap::new(),
            levels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelSetting {
    pub level: i64,
    pub points_cumulative: i64,
    #[serde(default)]
    pub reward_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_db_path() -> String {
    "rollcall.db".to_string()
}
fn default_checkin_window_mins() -> i64 {
    15
}
fn default_grace_mins() -> i64 {
    10
}
fn default_absence_batch_size() -> u32 {
    500
}
fn default_audit_limit() -> u32 {
    100
}
fn default_streak_window_hours() -> i64 {
    48
}
fn default_attendee_role() -> String {
    "volunteer".to_string()
}
fn default_interval_secs() -> u64 {
    60
}
