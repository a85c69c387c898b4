use crate::api::{BookAnalysis, BookId, BookPage, BookQuery, Borrow, Recommendations, UserId};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Request signature of a cached resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// One catalogue page
    Books(BookQuery),
    /// Summary and review consensus of one book
    Analysis(BookId),
    /// Recommendations for the signed-in user
    Recommendations,
    /// Active borrows of one user
    Borrowed(UserId),
}

impl QueryKey {
    /// Invalidation tags this entry belongs to
    pub fn tags(&self) -> Vec<Tag> {
        match self {
            QueryKey::Books(_) => vec![Tag::Books],
            QueryKey::Analysis(book_id) => vec![Tag::Books, Tag::BookAnalysis(*book_id)],
            QueryKey::Recommendations => vec![Tag::Recommendations],
            QueryKey::Borrowed(_) => vec![Tag::Borrows],
        }
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags().contains(&tag)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Books(query) => {
                write!(f, "books[page={}, size={}", query.page, query.page_size)?;
                if let Some(genre) = &query.genre {
                    write!(f, ", genre={}", genre)?;
                }
                f.write_str("]")
            }
            QueryKey::Analysis(book_id) => write!(f, "books[{}]/analysis", book_id),
            QueryKey::Recommendations => f.write_str("recommendations"),
            QueryKey::Borrowed(user_id) => write!(f, "users[{}]/borrowed", user_id),
        }
    }
}

/// Label grouping entries that go stale together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Every catalogue page and every book analysis
    Books,
    /// The analysis of a single book
    BookAnalysis(BookId),
    Recommendations,
    Borrows,
}

impl Tag {
    /// Tags whose entries belong to the signed-in user and die with the session
    pub const SESSION_SCOPED: [Tag; 2] = [Tag::Borrows, Tag::Recommendations];
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Books => f.write_str("books"),
            Tag::BookAnalysis(book_id) => write!(f, "books[{}]/analysis", book_id),
            Tag::Recommendations => f.write_str("recommendations"),
            Tag::Borrows => f.write_str("borrows"),
        }
    }
}

/// Payload of a resolved query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Books(BookPage),
    Analysis(BookAnalysis),
    Recommendations(Recommendations),
    Borrowed(Vec<Borrow>),
}

impl QueryData {
    pub fn as_books(&self) -> Option<&BookPage> {
        match self {
            QueryData::Books(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_analysis(&self) -> Option<&BookAnalysis> {
        match self {
            QueryData::Analysis(analysis) => Some(analysis),
            _ => None,
        }
    }

    pub fn as_recommendations(&self) -> Option<&Recommendations> {
        match self {
            QueryData::Recommendations(recommendations) => Some(recommendations),
            _ => None,
        }
    }

    pub fn as_borrowed(&self) -> Option<&[Borrow]> {
        match self {
            QueryData::Borrowed(borrows) => Some(borrows),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Nothing fetched yet, or the entry was dropped with the session
    Idle,
    Pending,
    Resolved,
    Errored,
}

/// Freshness of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Fetching,
}

/// What a subscriber observes for one key.
///
/// `data` is kept across refetches and failures so the UI can keep showing
/// the last good payload next to a pending or error indicator.
#[derive(Debug, Clone)]
pub struct QueryState {
    pub status: QueryStatus,
    pub data: Option<Arc<QueryData>>,
    pub error: Option<SyncError>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl QueryState {
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != QueryStatus::Pending
    }

    /// Collapse a settled state into the caller-facing result
    pub fn into_result(self) -> SyncResult<Arc<QueryData>> {
        match self.status {
            QueryStatus::Resolved => self.data.ok_or(SyncError::Discarded),
            QueryStatus::Errored => Err(self.error.unwrap_or(SyncError::Discarded)),
            QueryStatus::Idle | QueryStatus::Pending => Err(SyncError::Discarded),
        }
    }
}
