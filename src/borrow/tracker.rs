use crate::api::BookId;
use crate::cache::{QueryCache, QueryKey, Tag};
use crate::error::{SyncError, SyncResult};
use crate::session::SessionManager;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Membership {
    /// Session epoch the set was fetched under
    epoch: u64,
    books: HashSet<BookId>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Authoritative record of which books the current session holds.
///
/// Only ever replaced wholesale from the service's borrowed list; never
/// edited in anticipation of a mutation.
pub struct BorrowStateTracker {
    session: Arc<SessionManager>,
    cache: Arc<QueryCache>,
    membership: RwLock<Membership>,
}

impl BorrowStateTracker {
    pub fn new(session: Arc<SessionManager>, cache: Arc<QueryCache>) -> Self {
        Self {
            session,
            cache,
            membership: RwLock::new(Membership::default()),
        }
    }

    /// Refetch the session user's active borrows and replace the set.
    ///
    /// On failure the previous set is kept. A result that lands after the
    /// session changed is dropped.
    pub async fn refresh(&self) -> SyncResult<HashSet<BookId>> {
        let epoch = self.session.epoch();
        let Some(user_id) = self.session.user_id() else {
            debug!("No session, membership stays empty");
            return Err(SyncError::Unauthenticated);
        };

        // Whatever is cached predates the acknowledgment that triggered us.
        self.cache.invalidate(Tag::Borrows).await;
        let data = match self.cache.read(QueryKey::Borrowed(user_id)).await.settled().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Membership refresh failed, keeping previous set: {}", e);
                return Err(e);
            }
        };

        let books: HashSet<BookId> = data
            .as_borrowed()
            .unwrap_or_default()
            .iter()
            .filter(|borrow| borrow.is_active())
            .map(|borrow| borrow.book_id)
            .collect();

        let mut membership = self.membership.write().await;
        if self.session.epoch() != epoch {
            debug!("Session changed during membership refresh, discarding");
            return Err(SyncError::Discarded);
        }
        info!("User {} holds {} book(s)", user_id, books.len());
        *membership = Membership {
            epoch,
            books: books.clone(),
            refreshed_at: Some(Utc::now()),
        };
        Ok(books)
    }

    /// Whether the current session holds `book_id`
    pub async fn holds(&self, book_id: BookId) -> bool {
        let membership = self.membership.read().await;
        membership.epoch == self.session.epoch() && membership.books.contains(&book_id)
    }

    /// Snapshot of the set; empty when it belongs to an ended session
    pub async fn books(&self) -> HashSet<BookId> {
        let membership = self.membership.read().await;
        if membership.epoch == self.session.epoch() {
            membership.books.clone()
        } else {
            HashSet::new()
        }
    }

    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        let membership = self.membership.read().await;
        (membership.epoch == self.session.epoch())
            .then_some(membership.refreshed_at)
            .flatten()
    }
}
