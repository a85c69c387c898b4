use crate::api::{BookId, NewBook, NewReview};
use crate::borrow::BorrowStateTracker;
use crate::cache::{QueryCache, Tag};
use crate::env;
use crate::error::{SyncError, SyncResult};
use crate::mutation::types::*;
use crate::session::SessionManager;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

type IntentKey = (MutationKind, Option<BookId>);

/// Removes its intent from the pending table when the dispatch ends, however
/// it ends
struct PendingGuard<'a> {
    pending: &'a DashMap<IntentKey, MutationIntent>,
    key: IntentKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

/// Dispatches server writes with confirm-then-update semantics.
///
/// Nothing local changes until the service acknowledges; at most one intent
/// per (kind, target) is outstanding.
pub struct MutationExecutor {
    session: Arc<SessionManager>,
    cache: Arc<QueryCache>,
    tracker: Arc<BorrowStateTracker>,
    pending: DashMap<IntentKey, MutationIntent>,
    events: broadcast::Sender<MutationEvent>,
}

impl MutationExecutor {
    pub fn new(
        session: Arc<SessionManager>,
        cache: Arc<QueryCache>,
        tracker: Arc<BorrowStateTracker>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session,
            cache,
            tracker,
            pending: DashMap::new(),
            events,
        }
    }

    /// Run `mutation` to acknowledgment.
    ///
    /// Resolves once the commit's local updates are done; fails without
    /// retrying and without touching local state.
    pub async fn mutate(&self, mutation: Mutation) -> SyncResult<MutationOutput> {
        let kind = mutation.kind();
        let target = mutation.target();

        self.check(&mutation).await?;
        if !self.session.is_authenticated() {
            return Err(SyncError::Unauthenticated);
        }

        let (intent, _guard) = self.register(kind, target)?;
        info!("Dispatching {} for {}", kind, describe_target(target));
        self.emit(&intent, IntentState::Pending, None);

        let epoch = self.session.epoch();
        let tags = mutation.invalidates();

        match self.dispatch(mutation).await {
            Ok(output) => {
                let same_session = self.session.epoch() == epoch;
                for tag in tags {
                    // Shared tags are invalidated even across a session change.
                    if same_session || !Tag::SESSION_SCOPED.contains(&tag) {
                        self.cache.invalidate(tag).await;
                    }
                }
                if !same_session {
                    info!("Session changed before {} was acknowledged, skipping membership update", kind);
                } else if kind.touches_membership() {
                    if let Err(e) = self.tracker.refresh().await {
                        warn!("{} committed but membership refresh failed: {}", kind, e);
                    }
                }
                debug!("Committed {} for {}", kind, describe_target(target));
                self.emit(&intent, IntentState::Committed, None);
                Ok(output)
            }
            Err(error) => {
                warn!("{} for {} failed: {}", kind, describe_target(target), error);
                self.emit(&intent, IntentState::Failed, Some(error.clone()));
                Err(error)
            }
        }
    }

    /// Pending intents, for rendering busy indicators
    pub fn pending(&self) -> Vec<MutationIntent> {
        self.pending.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn is_pending(&self, kind: MutationKind, target: Option<BookId>) -> bool {
        self.pending.contains_key(&(kind, target))
    }

    pub fn events(&self) -> broadcast::Receiver<MutationEvent> {
        self.events.subscribe()
    }

    /// Client-side gates, evaluated before anything reaches the network
    async fn check(&self, mutation: &Mutation) -> SyncResult<()> {
        match mutation {
            Mutation::SubmitReview { book_id, review } => {
                if !self.tracker.holds(*book_id).await {
                    info!("Rejecting review of book {} not held by the session", book_id);
                    return Err(SyncError::ReviewNotPermitted(*book_id));
                }
                validate_review(review)
            }
            Mutation::CreateBook(book) => validate_new_book(book),
            _ => Ok(()),
        }
    }

    fn register(
        &self,
        kind: MutationKind,
        target: Option<BookId>,
    ) -> SyncResult<(MutationIntent, PendingGuard<'_>)> {
        let key = (kind, target);
        match self.pending.entry(key) {
            Entry::Occupied(_) => {
                debug!("Rejecting duplicate {} for {}", kind, describe_target(target));
                Err(SyncError::MutationInFlight {
                    kind,
                    target: describe_target(target),
                })
            }
            Entry::Vacant(slot) => {
                let mut intent = MutationIntent::new(kind, target);
                intent.state = IntentState::Pending;
                slot.insert(intent.clone());
                Ok((
                    intent,
                    PendingGuard {
                        pending: &self.pending,
                        key,
                    },
                ))
            }
        }
    }

    async fn dispatch(&self, mutation: Mutation) -> SyncResult<MutationOutput> {
        let session = &self.session;
        match mutation {
            Mutation::Borrow(book_id) => session
                .authorized(move |api, token| async move { api.borrow(&token, book_id).await })
                .await
                .map(MutationOutput::Borrowed),
            Mutation::Return(book_id) => session
                .authorized(move |api, token| async move { api.return_book(&token, book_id).await })
                .await
                .map(MutationOutput::Returned),
            Mutation::SubmitReview { book_id, review } => session
                .authorized(move |api, token| async move {
                    api.submit_review(&token, book_id, &review).await
                })
                .await
                .map(MutationOutput::Reviewed),
            Mutation::CreateBook(book) => session
                .authorized(move |api, token| async move { api.create_book(&token, &book).await })
                .await
                .map(MutationOutput::Created),
            Mutation::UpdateBook { book_id, update } => session
                .authorized(move |api, token| async move {
                    api.update_book(&token, book_id, &update).await
                })
                .await
                .map(MutationOutput::Updated),
            Mutation::DeleteBook(book_id) => session
                .authorized(move |api, token| async move { api.delete_book(&token, book_id).await })
                .await
                .map(|()| MutationOutput::Deleted(book_id)),
        }
    }

    fn emit(&self, intent: &MutationIntent, state: IntentState, error: Option<SyncError>) {
        let _ = self.events.send(MutationEvent {
            intent: intent.id,
            kind: intent.kind,
            target: intent.target,
            state,
            error,
            at: Utc::now(),
        });
    }
}

/// Rating and body bounds the service enforces, checked before dispatch
pub fn validate_review(review: &NewReview) -> SyncResult<()> {
    if !(env::review::MIN_RATING..=env::review::MAX_RATING).contains(&review.rating) {
        return Err(SyncError::InvalidInput(format!(
            "Rating must be between {} and {}",
            env::review::MIN_RATING,
            env::review::MAX_RATING
        )));
    }
    if review.body.trim().chars().count() < env::review::MIN_BODY_CHARS {
        return Err(SyncError::InvalidInput(format!(
            "Review must be at least {} characters",
            env::review::MIN_BODY_CHARS
        )));
    }
    Ok(())
}

pub fn validate_new_book(book: &NewBook) -> SyncResult<()> {
    if book.title.trim().is_empty() {
        return Err(SyncError::InvalidInput("Title is required".to_string()));
    }
    if book.author.trim().is_empty() {
        return Err(SyncError::InvalidInput("Author is required".to_string()));
    }
    if book.file.bytes.is_empty() {
        return Err(SyncError::InvalidInput("A book file is required".to_string()));
    }
    Ok(())
}
