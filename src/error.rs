//! Engine error types.

use thiserror::Error;

/// Failure classes surfaced to callers of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ValidationFailed,
    InvariantViolation,
    TransientStoreFailure,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("no valid fields to update")]
    NoValidFields,

    #[error("users cannot confirm their own report")]
    SelfConfirmation,

    #[error("report already confirmed by this user")]
    AlreadyConfirmed,

    #[error("store error: {0}")]
    Store(sqlx::Error),
}

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Foreign key violations name a record that does not exist, so they are
/// reported as such instead of as a store failure.
impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
                return Self::NotFound(referenced_entity(db.constraint()));
            }
        }
        Self::Store(err)
    }
}

fn referenced_entity(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("reports_assigned_to_fkey") => "assigned user",
        Some(name) if name.ends_with("report_id_fkey") => "report",
        Some(name) if name.ends_with("user_id_fkey") || name.ends_with("_by_fkey") => "user",
        _ => "referenced record",
    }
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ValidationFailed(_) | Self::NoValidFields => ErrorKind::ValidationFailed,
            Self::SelfConfirmation | Self::AlreadyConfirmed => ErrorKind::InvariantViolation,
            Self::Store(_) => ErrorKind::TransientStoreFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
