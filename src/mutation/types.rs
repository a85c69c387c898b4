use crate::api::{Book, BookId, BookUpdate, Borrow, NewBook, NewReview, Review};
use crate::cache::Tag;
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a mutation intent
pub type IntentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Borrow,
    Return,
    Review,
    CreateBook,
    UpdateBook,
    DeleteBook,
}

impl MutationKind {
    /// Whether a commit changes which books the session holds
    pub fn touches_membership(&self) -> bool {
        matches!(self, MutationKind::Borrow | MutationKind::Return)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Borrow => "borrow",
            MutationKind::Return => "return",
            MutationKind::Review => "review",
            MutationKind::CreateBook => "create book",
            MutationKind::UpdateBook => "update book",
            MutationKind::DeleteBook => "delete book",
        };
        f.write_str(name)
    }
}

/// A server-side write requested by the user
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Borrow(BookId),
    Return(BookId),
    SubmitReview { book_id: BookId, review: NewReview },
    CreateBook(NewBook),
    UpdateBook { book_id: BookId, update: BookUpdate },
    DeleteBook(BookId),
}

impl Mutation {
    pub fn review(book_id: BookId, rating: u8, body: impl Into<String>) -> Self {
        Mutation::SubmitReview {
            book_id,
            review: NewReview {
                rating,
                body: body.into(),
            },
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Borrow(_) => MutationKind::Borrow,
            Mutation::Return(_) => MutationKind::Return,
            Mutation::SubmitReview { .. } => MutationKind::Review,
            Mutation::CreateBook(_) => MutationKind::CreateBook,
            Mutation::UpdateBook { .. } => MutationKind::UpdateBook,
            Mutation::DeleteBook(_) => MutationKind::DeleteBook,
        }
    }

    /// Book the mutation acts on; `None` for a book that does not exist yet
    pub fn target(&self) -> Option<BookId> {
        match self {
            Mutation::Borrow(book_id)
            | Mutation::Return(book_id)
            | Mutation::DeleteBook(book_id)
            | Mutation::SubmitReview { book_id, .. }
            | Mutation::UpdateBook { book_id, .. } => Some(*book_id),
            Mutation::CreateBook(_) => None,
        }
    }

    /// Tags made stale by a committed mutation
    pub fn invalidates(&self) -> Vec<Tag> {
        match self {
            Mutation::SubmitReview { book_id, .. } => vec![Tag::BookAnalysis(*book_id)],
            Mutation::Borrow(_)
            | Mutation::Return(_)
            | Mutation::CreateBook(_)
            | Mutation::UpdateBook { .. }
            | Mutation::DeleteBook(_) => vec![Tag::Books],
        }
    }
}

/// Human-readable mutation target, as used in rejection messages
pub fn describe_target(target: Option<BookId>) -> String {
    match target {
        Some(book_id) => format!("book {}", book_id),
        None => "new book".to_string(),
    }
}

/// Server acknowledgment of a committed mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutput {
    Borrowed(Borrow),
    Returned(Borrow),
    Reviewed(Review),
    Created(Book),
    Updated(Book),
    Deleted(BookId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentState {
    Idle,
    Pending,
    Committed,
    Failed,
}

/// One dispatched mutation, tracked from dispatch to acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent {
    pub id: IntentId,
    pub kind: MutationKind,
    pub target: Option<BookId>,
    pub state: IntentState,
    pub started_at: DateTime<Utc>,
}

impl MutationIntent {
    pub fn new(kind: MutationKind, target: Option<BookId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            target,
            state: IntentState::Idle,
            started_at: Utc::now(),
        }
    }
}

/// State transition of an intent, for rendering code
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    pub intent: IntentId,
    pub kind: MutationKind,
    pub target: Option<BookId>,
    pub state: IntentState,
    pub error: Option<SyncError>,
    pub at: DateTime<Utc>,
}
