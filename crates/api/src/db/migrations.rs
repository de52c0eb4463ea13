//! Canonical migration definitions.

/// A named migration: `(name, sql)`.
pub type Migration = (&'static str, &'static str);

/// Schema migrations, applied in order and recorded in `_migrations`.
pub const MIGRATIONS: &[Migration] = &[
    (
        "0001_attendance",
        include_str!("../../migrations/0001_attendance.sql"),
    ),
    (
        "0002_gamification",
        include_str!("../../migrations/0002_gamification.sql"),
    ),
    (
        "0003_seed_catalog",
        include_str!("../../migrations/0003_seed_catalog.sql"),
    ),
    (
        "0004_achievement_mappings",
        include_str!("../../migrations/0004_achievement_mappings.sql"),
    ),
];
