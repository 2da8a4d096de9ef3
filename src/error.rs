//! Error types for the carpool chat service.
//!
//! Every error a turn can produce maps to exactly one chat-style message
//! (the `Display` output) plus a status classification; the transport layer
//! turns that into an HTTP status. Errors are values all the way up — the
//! dialogue engine and matching workflow never leave a session partially
//! updated when one is returned.

/// Top-level error type for a chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Malformed or unanswerable slot input. The prompt re-asks the open
    /// question; the session is untouched and the turn is safe to resend.
    #[error("{0}")]
    Validation(String),

    /// A business-rule conflict: double-booking, overlapping times, joining
    /// your own ride, choosing while already committed.
    #[error("{0}")]
    Conflict(String),

    /// A referenced offer or passenger no longer exists.
    #[error("{0}")]
    NotFound(String),

    /// Missing or expired session token, or acting on someone else's offer.
    #[error("{0}")]
    Unauthorized(String),

    /// A collaborator (repository, directions, time parser) failed.
    /// Surfaced verbatim so the root cause is never masked.
    #[error("External error: {0}")]
    External(#[from] ExternalError),
}

impl ChatError {
    /// Short classification label, used in logs and the wire response.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::External(_) => "external",
        }
    }
}

/// Failures of external collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),

    #[error("directions: {0}")]
    Directions(#[from] DirectionsError),
}

/// Repository-level errors.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Directions provider errors.
#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No route found between {from} and {to}")]
    NoRoute { from: String, to: String },
}

/// Human-time parser errors.
#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Unrecognized time expression: {0:?}")]
    Unrecognized(String),
}

/// Result type alias for chat turns.
pub type Result<T> = std::result::Result<T, ChatError>;

impl From<RepositoryError> for ChatError {
    fn from(err: RepositoryError) -> Self {
        Self::External(ExternalError::Repository(err))
    }
}
