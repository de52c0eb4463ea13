use rollcall_core::RuleError;

/// Errors surfaced by store and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    WindowNotOpen(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("migration {name} failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Short machine-readable name, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::WindowNotOpen(_) => "window_not_open",
            Self::Validation(_) | Self::Rule(_) => "validation",
            Self::Forbidden(_) => "forbidden",
            Self::Storage(_) | Self::Migration { .. } | Self::Io(_) => "storage",
            Self::Json(_) => "serialization",
        }
    }

    /// HTTP-style status for callers that expose operations over a transport.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidState(_) | Self::WindowNotOpen(_) => 409,
            Self::Validation(_) | Self::Rule(_) => 400,
            Self::Forbidden(_) => 403,
            Self::Storage(_) | Self::Json(_) | Self::Migration { .. } | Self::Io(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attendance_errors_keep_their_message() {
        let err = StoreError::invalid_state("Cannot check in: Event is completed");
        assert_eq!(err.to_string(), "Cannot check in: Event is completed");
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn rule_errors_are_validation_failures() {
        let err: StoreError = RuleError::UnknownAction("NOPE".into()).into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.kind(), "validation");
    }
}
