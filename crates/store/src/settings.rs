//! System settings consulted by the rewards engine.

use rollcall_core::GamificationAction;
use rollcall_runtime_config::GamificationSettings;
use std::collections::HashMap;

pub const ENABLE_BADGES: &str = "gamification.enable_badges";

/// Read-only view of system settings.
pub trait SettingsProvider: Send + Sync {
    fn get_bool(&self, key: &str, default: bool) -> bool;
    fn get_i64(&self, key: &str) -> Option<i64>;

    fn badges_enabled(&self) -> bool {
        self.get_bool(ENABLE_BADGES, true)
    }

    fn action_points(&self, action: GamificationAction) -> Option<i64> {
        self.get_i64(&action.points_setting_key())
    }
}

/// Settings backed by the `[gamification]` config section.
#[derive(Debug, Clone)]
pub struct ConfigSettings {
    enable_badges: bool,
    points: HashMap<String, i64>,
}

impl ConfigSettings {
    pub fn new(settings: &GamificationSettings) -> Self {
        let points = settings
            .points
            .iter()
            .filter_map(|(name, points)| match name.parse::<GamificationAction>() {
                Ok(action) => Some((action.points_setting_key(), *points)),
                Err(e) => {
                    tracing::warn!("Ignoring point override: {e}");
                    None
                }
            })
            .collect();
        Self {
            enable_badges: settings.enable_badges,
            points,
        }
    }
}

impl SettingsProvider for ConfigSettings {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        if key == ENABLE_BADGES {
            self.enable_badges
        } else {
            default
        }
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.points.get(key).copied()
    }
}

/// In-memory key/value settings.
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    bools: HashMap<String, bool>,
    ints: HashMap<String, i64>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bool(mut self, key: &str, value: bool) -> Self {
        self.bools.insert(key.to_string(), value);
        self
    }

    pub fn with_i64(mut self, key: &str, value: i64) -> Self {
        self.ints.insert(key.to_string(), value);
        self
    }
}

impl SettingsProvider for MapSettings {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.bools.get(key).copied().unwrap_or(default)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.ints.get(key).copied()
    }
}
