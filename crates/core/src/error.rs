use thiserror::Error;

/// Errors raised while loading or validating reward rules and catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("invalid thresholds for {code}: expected bronze < silver < gold, got {bronze}/{silver}/{gold}")]
    InvalidThresholds {
        code: String,
        bronze: i64,
        silver: i64,
        gold: i64,
    },

    #[error("invalid level table: {0}")]
    InvalidLevelTable(String),

    #[error("unknown gamification action '{0}'")]
    UnknownAction(String),

    #[error("unknown achievement code '{0}'")]
    UnknownAchievement(String),

    #[error("unknown {kind} status '{value}'")]
    UnknownStatus { kind: &'static str, value: String },

    #[error("{field} must be between 0 and 10080 minutes, got {minutes}")]
    WindowOutOfRange { field: &'static str, minutes: i64 },

    #[error("unknown threshold type '{0}'")]
    UnknownThresholdKind(String),
}
