//! Client-level error taxonomy.

use crate::api::{ApiError, BookId};
use crate::mutation::MutationKind;

/// Outcome of a failed client operation.
///
/// Wraps classified remote failures and adds the rejections the client makes
/// on its own, before anything reaches the network.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("not signed in")]
    Unauthenticated,
    #[error("mutation in flight: {kind} for {target}")]
    MutationInFlight {
        kind: MutationKind,
        target: String,
    },
    #[error("book {0} must be borrowed before it can be reviewed")]
    ReviewNotPermitted(BookId),
    #[error("{0}")]
    InvalidInput(String),
    #[error("query discarded: session ended")]
    Discarded,
    #[error("token storage failed: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn is_auth_denied(&self) -> bool {
        matches!(self, SyncError::Api(ApiError::AuthDenied(_)))
    }

    /// Short message for display, falling back to `default` for failures
    /// that carry nothing a reader could act on
    pub fn user_message(&self, default: &str) -> String {
        match self {
            SyncError::Api(ApiError::Server(_)) | SyncError::Storage(_) => default.to_string(),
            SyncError::Api(error) if error.message().is_empty() => default.to_string(),
            other => other.to_string(),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_validation_detail() {
        let error = SyncError::Api(ApiError::Validation("Book is currently borrowed".to_string()));
        assert_eq!(error.user_message("Could not borrow book."), "Book is currently borrowed");
    }

    #[test]
    fn test_user_message_hides_server_detail() {
        let error = SyncError::Api(ApiError::Server("traceback ...".to_string()));
        assert_eq!(error.user_message("Could not borrow book."), "Could not borrow book.");
    }

    #[test]
    fn test_in_flight_message() {
        let error = SyncError::MutationInFlight {
            kind: MutationKind::Borrow,
            target: "book 7".to_string(),
        };
        assert_eq!(error.to_string(), "mutation in flight: borrow for book 7");
    }
}
