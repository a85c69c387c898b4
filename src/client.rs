//! Client facade wiring session, cache, membership and mutations together.

use crate::api::*;
use crate::borrow::BorrowStateTracker;
use crate::cache::{QueryCache, QueryData, QueryFetcher, QueryKey, Subscription};
use crate::config::ShelfConfig;
use crate::error::{SyncError, SyncResult};
use crate::mutation::{Mutation, MutationEvent, MutationExecutor, MutationOutput};
use crate::session::{SessionEvent, SessionManager, SessionSnapshot};
use crate::storage::{FileTokenStore, TokenStore};
use anyhow::Context;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Fetches cache payloads through the session so every read carries the
/// current credential and auth denials end the session.
struct SessionFetcher {
    session: Weak<SessionManager>,
}

impl QueryFetcher for SessionFetcher {
    fn fetch(&self, key: QueryKey) -> BoxFuture<'static, SyncResult<QueryData>> {
        let session = self.session.clone();
        Box::pin(async move {
            let Some(session) = session.upgrade() else {
                return Err(SyncError::Discarded);
            };

            match key {
                QueryKey::Books(query) => session
                    .optional(move |api, token| async move { api.list_books(token.as_ref(), &query).await })
                    .await
                    .map(QueryData::Books),
                QueryKey::Analysis(book_id) => session
                    .optional(move |api, token| async move {
                        api.fetch_analysis(token.as_ref(), book_id).await
                    })
                    .await
                    .map(QueryData::Analysis),
                QueryKey::Recommendations => session
                    .authorized(|api, token| async move { api.fetch_recommendations(&token).await })
                    .await
                    .map(QueryData::Recommendations),
                QueryKey::Borrowed(user_id) => session
                    .authorized(move |api, token| async move {
                        api.borrowed_books(&token, user_id).await
                    })
                    .await
                    .map(QueryData::Borrowed),
            }
        })
    }
}

/// Construction knobs that do not concern the remote service
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub stale_after: Option<Duration>,
    pub page_size: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            stale_after: None,
            page_size: crate::env::api::DEFAULT_PAGE_SIZE,
        }
    }
}

impl From<&ShelfConfig> for ClientOptions {
    fn from(config: &ShelfConfig) -> Self {
        Self {
            stale_after: config.cache.stale_after(),
            page_size: config.books.page_size,
        }
    }
}

/// Everything rendering code talks to
pub struct LibraryClient {
    session: Arc<SessionManager>,
    cache: Arc<QueryCache>,
    tracker: Arc<BorrowStateTracker>,
    executor: MutationExecutor,
    options: ClientOptions,
}

impl LibraryClient {
    pub fn new(api: Arc<dyn LibraryApi>, store: Arc<dyn TokenStore>, options: ClientOptions) -> Self {
        info!("Creating library client ({} backend)", api.provider_name());

        let stale_after = options.stale_after;
        let session = Arc::new_cyclic(|session: &Weak<SessionManager>| {
            let fetcher = Arc::new(SessionFetcher {
                session: session.clone(),
            });
            let cache = Arc::new(QueryCache::new(fetcher, stale_after));
            SessionManager::new(api, store, cache)
        });
        let cache = Arc::clone(session.cache());
        let tracker = Arc::new(BorrowStateTracker::new(Arc::clone(&session), Arc::clone(&cache)));
        let executor = MutationExecutor::new(Arc::clone(&session), Arc::clone(&cache), Arc::clone(&tracker));

        Self {
            session,
            cache,
            tracker,
            executor,
            options,
        }
    }

    /// Client against the HTTP service with a file token store
    pub fn from_config(config: &ShelfConfig) -> anyhow::Result<Self> {
        let api = HttpLibraryApi::new(&config.api).context("Failed to create HTTP client")?;
        let token_file = config.token_file().context("Failed to resolve token file")?;

        Ok(Self::new(
            Arc::new(api),
            Arc::new(FileTokenStore::new(token_file)),
            ClientOptions::from(config),
        ))
    }

    /// Restore a persisted session and its membership set
    pub async fn initialize(&self) -> Option<User> {
        let user = self.session.initialize().await?;
        let _ = self.tracker.refresh().await;
        Some(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> SyncResult<User> {
        let user = self.session.login(email, password).await?;
        if let Err(e) = self.tracker.refresh().await {
            warn!("Signed in without a membership set: {}", e);
        }
        Ok(user)
    }

    pub async fn signup(&self, request: &SignupRequest) -> SyncResult<User> {
        self.session.signup(request).await
    }

    pub async fn logout(&self) {
        self.session.logout().await;
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> SyncResult<User> {
        self.session.update_profile(update).await
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn session_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.session_state()
    }

    pub fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.events()
    }

    pub fn mutation_events(&self) -> broadcast::Receiver<MutationEvent> {
        self.executor.events()
    }

    /// Subscribe to any cache key
    pub async fn subscribe(&self, key: QueryKey) -> Subscription {
        self.cache.read(key).await
    }

    /// Subscribe to catalogue page `page` at the configured page size
    pub async fn books(&self, page: u32, genre: Option<String>) -> Subscription {
        let mut query = BookQuery::page(page, self.options.page_size);
        query.genre = genre;
        self.subscribe(QueryKey::Books(query)).await
    }

    pub async fn analysis(&self, book_id: BookId) -> Subscription {
        self.subscribe(QueryKey::Analysis(book_id)).await
    }

    pub async fn recommendations(&self) -> SyncResult<Subscription> {
        if !self.session.is_authenticated() {
            return Err(SyncError::Unauthenticated);
        }
        Ok(self.subscribe(QueryKey::Recommendations).await)
    }

    /// Subscribe to the session user's borrowed list
    pub async fn borrowed(&self) -> SyncResult<Subscription> {
        let user_id = self.session.user_id().ok_or(SyncError::Unauthenticated)?;
        Ok(self.subscribe(QueryKey::Borrowed(user_id)).await)
    }

    pub async fn fetch_books(&self, page: u32, genre: Option<String>) -> SyncResult<BookPage> {
        let data = self.books(page, genre).await.settled().await?;
        data.as_books().cloned().ok_or(SyncError::Discarded)
    }

    pub async fn fetch_analysis(&self, book_id: BookId) -> SyncResult<BookAnalysis> {
        let data = self.analysis(book_id).await.settled().await?;
        data.as_analysis().cloned().ok_or(SyncError::Discarded)
    }

    pub async fn fetch_recommendations(&self) -> SyncResult<Recommendations> {
        let data = self.recommendations().await?.settled().await?;
        data.as_recommendations().cloned().ok_or(SyncError::Discarded)
    }

    pub async fn fetch_borrowed(&self) -> SyncResult<Vec<Borrow>> {
        let data = self.borrowed().await?.settled().await?;
        data.as_borrowed().map(<[Borrow]>::to_vec).ok_or(SyncError::Discarded)
    }

    pub async fn mutate(&self, mutation: Mutation) -> SyncResult<MutationOutput> {
        self.executor.mutate(mutation).await
    }

    pub async fn borrow(&self, book_id: BookId) -> SyncResult<MutationOutput> {
        self.mutate(Mutation::Borrow(book_id)).await
    }

    pub async fn return_book(&self, book_id: BookId) -> SyncResult<MutationOutput> {
        self.mutate(Mutation::Return(book_id)).await
    }

    pub async fn review(&self, book_id: BookId, rating: u8, body: &str) -> SyncResult<MutationOutput> {
        self.mutate(Mutation::review(book_id, rating, body)).await
    }

    /// Whether the session currently holds `book_id`
    pub async fn holds(&self, book_id: BookId) -> bool {
        self.tracker.holds(book_id).await
    }

    pub async fn membership(&self) -> HashSet<BookId> {
        self.tracker.books().await
    }

    pub async fn refresh_membership(&self) -> SyncResult<HashSet<BookId>> {
        self.tracker.refresh().await
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn executor(&self) -> &MutationExecutor {
        &self.executor
    }
}
