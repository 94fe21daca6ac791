use thiserror::Error;
use vmcron_core::ControlError;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The cron expression is malformed.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// The schedule target does not exist or cannot take the requested action.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// A blackout window definition is out of range.
    #[error("Invalid blackout window: {0}")]
    InvalidBlackout(String),

    /// A stored row could not be decoded into a domain type.
    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    /// No row with the given id exists in the store.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// The action was refused before reaching the control plane.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The control plane rejected or failed the request.
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] ControlError),
}

impl SchedulerError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        SchedulerError::NotFound { entity, id }
    }

    /// Whether the error stems from caller input rather than the environment.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidCron { .. }
                | SchedulerError::InvalidTarget(_)
                | SchedulerError::InvalidBlackout(_)
                | SchedulerError::Precondition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
