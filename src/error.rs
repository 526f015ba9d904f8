//! Error model shared by the ledger, order and booking operations.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Message raised by the booking overlap triggers (see `db.rs`).
pub(crate) const BOOKING_OVERLAP: &str = "booking_overlap";

/// Coarse classification handlers map onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    ReferentialConflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock for {name} (ID: {item_id}): requested {requested}, available {available}")]
    InsufficientStock {
        item_id: i64,
        name: String,
        requested: i64,
        available: i64,
    },

    #[error("item {0} does not track stock")]
    ItemNotTracked(i64),

    #[error("table {table_id} is not available for the requested time")]
    ResourceNotAvailable { table_id: i64 },

    #[error("cannot change status from '{from}' to '{to}'")]
    StatusTransition { from: String, to: String },

    #[error("referential conflict: {0}")]
    ReferentialConflict(String),

    #[error("duplicate value: {0}")]
    Duplicate(String),

    #[error("storage failure")]
    Storage(#[source] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(error = %msg, "internal failure");
        Self::Internal(msg)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InsufficientStock { .. }
            | Self::ItemNotTracked(_)
            | Self::ResourceNotAvailable { .. }
            | Self::StatusTransition { .. }
            | Self::Duplicate(_) => ErrorKind::Conflict,
            Self::ReferentialConflict(_) => ErrorKind::ReferentialConflict,
            Self::Storage(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Text safe to hand back to a caller. Internal failures stay opaque.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "an internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, Some(message)) = &err {
            if code.code == ErrorCode::ConstraintViolation {
                if message.contains("FOREIGN KEY") {
                    return Self::ReferentialConflict(
                        "record is referenced by, or references, a missing record".to_string(),
                    );
                }
                if let Some(columns) = message.strip_prefix("UNIQUE constraint failed: ") {
                    return Self::Duplicate(columns.to_string());
                }
            }
        }
        tracing::error!(error = %err, "storage failure");
        Self::Storage(err)
    }
}

/// True when the store rejected a write through the booking overlap triggers.
pub(crate) fn is_booking_overlap(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, Some(message))
            if code.code == ErrorCode::ConstraintViolation && message.contains(BOOKING_OVERLAP)
    )
}
