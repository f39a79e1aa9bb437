//! Circulation Error Types

use thiserror::Error;

use super::state::BookStatus;

/// Circulation error types
///
/// Precondition errors are returned before any write happens.
#[derive(Error, Debug, Clone)]
pub enum CirculationError {
    // === Lookup Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Handover thread not found: {0}")]
    ThreadNotFound(String),

    #[error("No active handover thread for this book")]
    NoActiveThread,

    // === State Errors ===
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Book already marked as completed")]
    AlreadyCompleted,

    #[error("Book already marked as delivered")]
    AlreadyDelivered,

    #[error("You have already marked this book as completed")]
    AlreadyCompletedByThisUser,

    // === Relationship Errors ===
    #[error("You are not the current holder of this book")]
    NotCurrentHolder,

    #[error("You are not the next holder for this book")]
    NotNextHolder,

    #[error("You are not a participant in this handover")]
    NotParticipant,

    // === Request Errors ===
    #[error("Book already requested by this user")]
    AlreadyRequested,

    #[error("Book is not available for request (status: {0})")]
    BookNotAvailable(BookStatus),

    #[error("Cannot determine current holder")]
    CannotDetermineHolder,

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl CirculationError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            CirculationError::NotFound(_) => "NOT_FOUND",
            CirculationError::ThreadNotFound(_) => "THREAD_NOT_FOUND",
            CirculationError::NoActiveThread => "NO_ACTIVE_THREAD",
            CirculationError::InvalidState(_) => "INVALID_STATE",
            CirculationError::AlreadyCompleted => "ALREADY_COMPLETED",
            CirculationError::AlreadyDelivered => "ALREADY_DELIVERED",
            CirculationError::AlreadyCompletedByThisUser => "ALREADY_COMPLETED_BY_USER",
            CirculationError::NotCurrentHolder => "NOT_CURRENT_HOLDER",
            CirculationError::NotNextHolder => "NOT_NEXT_HOLDER",
            CirculationError::NotParticipant => "NOT_PARTICIPANT",
            CirculationError::AlreadyRequested => "ALREADY_REQUESTED",
            CirculationError::BookNotAvailable(_) => "BOOK_NOT_AVAILABLE",
            CirculationError::CannotDetermineHolder => "CANNOT_DETERMINE_HOLDER",
            CirculationError::DatabaseError(_) => "DATABASE_ERROR",
            CirculationError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            CirculationError::NotFound(_)
            | CirculationError::ThreadNotFound(_)
            | CirculationError::NoActiveThread => 404,
            CirculationError::NotCurrentHolder
            | CirculationError::NotNextHolder
            | CirculationError::NotParticipant => 403,
            CirculationError::InvalidState(_)
            | CirculationError::AlreadyCompleted
            | CirculationError::AlreadyDelivered
            | CirculationError::AlreadyCompletedByThisUser
            | CirculationError::AlreadyRequested
            | CirculationError::BookNotAvailable(_) => 409,
            CirculationError::CannotDetermineHolder
            | CirculationError::DatabaseError(_)
            | CirculationError::SystemError(_) => 500,
        }
    }
}

pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> CirculationError {
    CirculationError::NotFound(format!("{what} {id}"))
}

impl From<sqlx::Error> for CirculationError {
    fn from(e: sqlx::Error) -> Self {
        CirculationError::DatabaseError(e.to_string())
    }
}

impl From<anyhow::Error> for CirculationError {
    fn from(e: anyhow::Error) -> Self {
        CirculationError::SystemError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CirculationError::AlreadyRequested.code(), "ALREADY_REQUESTED");
        assert_eq!(
            CirculationError::BookNotAvailable(BookStatus::Reserved).code(),
            "BOOK_NOT_AVAILABLE"
        );
        assert_eq!(CirculationError::NotNextHolder.code(), "NOT_NEXT_HOLDER");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(CirculationError::NotFound("book".into()).http_status(), 404);
        assert_eq!(CirculationError::NotParticipant.http_status(), 403);
        assert_eq!(CirculationError::AlreadyDelivered.http_status(), 409);
        assert_eq!(CirculationError::CannotDetermineHolder.http_status(), 500);
    }

    #[test]
    fn test_display() {
        let err = CirculationError::BookNotAvailable(BookStatus::Requested);
        assert_eq!(
            err.to_string(),
            "Book is not available for request (status: requested)"
        );
    }

    #[test]
    fn test_not_found_names_the_record() {
        let err = not_found("book", 42);
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.to_string().contains("book 42"));
    }
}
