use crate::api::{AccessToken, ApiError, ApiResult, LibraryApi, LoginRequest, ProfileUpdate, SignupRequest, TokenPair, User, UserId};
use crate::cache::{QueryCache, Tag};
use crate::error::{SyncError, SyncResult};
use crate::session::types::*;
use crate::storage::TokenStore;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, broadcast, watch};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Owns the authenticated session and every access to the token store.
///
/// Each session gets a new epoch. Work started under one epoch that lands
/// under another must not touch session-scoped state.
pub struct SessionManager {
    api: Arc<dyn LibraryApi>,
    store: Arc<dyn TokenStore>,
    cache: Arc<QueryCache>,
    session: RwLock<Option<Session>>,
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    epoch: AtomicU64,
}

impl SessionManager {
    pub fn new(api: Arc<dyn LibraryApi>, store: Arc<dyn TokenStore>, cache: Arc<QueryCache>) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::anonymous());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            api,
            store,
            cache,
            session: RwLock::new(None),
            snapshot,
            events,
            epoch: AtomicU64::new(0),
        }
    }

    /// Restore a persisted session, if any.
    ///
    /// Any failure leaves the client signed out and the stored tokens
    /// cleared; it is never reported as an error.
    pub async fn initialize(&self) -> Option<User> {
        self.snapshot.send_modify(|snapshot| snapshot.restoring = true);
        let restored = self.restore().await;
        self.snapshot.send_modify(|snapshot| snapshot.restoring = false);
        restored
    }

    async fn restore(&self) -> Option<User> {
        let tokens = match self.store.load().await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                debug!("No persisted session");
                return None;
            }
            Err(e) => {
                warn!("Unreadable token store, starting signed out: {}", e);
                self.clear_store().await;
                return None;
            }
        };

        match self.api.fetch_profile(&tokens.access_token).await {
            Ok(profile) => {
                info!("Restored session for user {}", profile.id);
                self.establish(tokens, profile.clone()).await;
                Some(profile)
            }
            Err(e) => {
                info!("Persisted session rejected ({}): {}", e.category(), e);
                self.clear_store().await;
                None
            }
        }
    }

    /// Exchange credentials for a session.
    ///
    /// Both tokens are durably stored before the profile fetch, so nothing
    /// issued after this returns can run ahead of them.
    pub async fn login(&self, email: &str, password: &str) -> SyncResult<User> {
        if self.session.read().await.is_some() {
            info!("Replacing active session");
            self.teardown().await;
        }

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        // A 401 here means bad credentials, not a dead session.
        let tokens = self.api.login(&request).await.map_err(|e| match e {
            ApiError::AuthDenied(message) => ApiError::Validation(message),
            other => other,
        })?;

        self.store.save(&tokens).await?;

        match self.api.fetch_profile(&tokens.access_token).await {
            Ok(profile) => {
                info!("Signed in as user {}", profile.id);
                self.establish(tokens, profile.clone()).await;
                Ok(profile)
            }
            Err(e) => {
                warn!("Profile fetch after login failed: {}", e);
                self.clear_store().await;
                Err(e.into())
            }
        }
    }

    /// Register an account. Does not sign in.
    pub async fn signup(&self, request: &SignupRequest) -> SyncResult<User> {
        let user = self.api.signup(request).await?;
        info!("Registered user {}", user.id);
        Ok(user)
    }

    /// End the session locally, telling the service on a best-effort basis
    pub async fn logout(&self) {
        let token = self.credential().await.0;
        if let Some(token) = token
            && let Err(e) = self.api.signout(&token).await
        {
            warn!("Remote sign out failed, continuing local logout: {}", e);
        }

        if self.teardown().await {
            info!("Signed out");
        }
        let _ = self.events.send(SessionEvent::SignedOut);
    }

    /// Forced logout after the service denied the credential.
    ///
    /// Skips the remote sign out; the credential is already dead.
    pub async fn expire(&self, reason: &str) {
        if self.teardown().await {
            warn!("Session expired: {}", reason);
            let _ = self.events.send(SessionEvent::Expired {
                reason: reason.to_string(),
            });
        }
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> SyncResult<User> {
        let epoch = self.epoch();
        let update = update.clone();
        let profile = self
            .authorized(move |api, token| async move { api.update_profile(&token, &update).await })
            .await?;

        let mut session = self.session.write().await;
        if let Some(active) = session.as_mut()
            && self.epoch() == epoch
        {
            active.profile = profile.clone();
            self.snapshot
                .send_replace(SessionSnapshot::authenticated(profile.clone()));
        }
        Ok(profile)
    }

    /// Run a call that requires the bearer credential.
    ///
    /// Without a session the call is rejected before reaching the service.
    pub async fn authorized<T, F, Fut>(&self, op: F) -> SyncResult<T>
    where
        F: FnOnce(Arc<dyn LibraryApi>, AccessToken) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let (token, epoch) = self.credential().await;
        let Some(token) = token else {
            debug!("Rejecting authenticated call without a session");
            return Err(SyncError::Unauthenticated);
        };

        let result = op(Arc::clone(&self.api), token).await;
        self.settle(result, epoch, true).await
    }

    /// Run a call that carries the credential when there is one
    pub async fn optional<T, F, Fut>(&self, op: F) -> SyncResult<T>
    where
        F: FnOnce(Arc<dyn LibraryApi>, Option<AccessToken>) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let (token, epoch) = self.credential().await;
        let credentialed = token.is_some();

        let result = op(Arc::clone(&self.api), token).await;
        self.settle(result, epoch, credentialed).await
    }

    async fn settle<T>(&self, result: ApiResult<T>, epoch: u64, credentialed: bool) -> SyncResult<T> {
        match result {
            Err(ApiError::AuthDenied(message)) if credentialed => {
                // Only the session that sent the credential may be expired by its denial.
                if self.epoch() == epoch {
                    self.expire(&message).await;
                }
                Err(SyncError::Api(ApiError::AuthDenied(message)))
            }
            other => other.map_err(SyncError::from),
        }
    }

    /// Cache whose session-scoped entries die with this session
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn current_user(&self) -> Option<User> {
        self.snapshot.borrow().profile.clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.snapshot.borrow().profile.as_ref().map(|profile| profile.id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot.borrow().authenticated
    }

    pub fn session_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Identifies the current session; changes on every establish and teardown
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub async fn access_token(&self) -> Option<AccessToken> {
        self.credential().await.0
    }

    async fn credential(&self) -> (Option<AccessToken>, u64) {
        let session = self.session.read().await;
        (
            session.as_ref().map(|s| s.access_token.clone()),
            self.epoch(),
        )
    }

    async fn establish(&self, tokens: TokenPair, profile: User) {
        let mut session = self.session.write().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *session = Some(Session::new(tokens, profile.clone()));
        drop(session);

        self.snapshot
            .send_replace(SessionSnapshot::authenticated(profile.clone()));
        let _ = self.events.send(SessionEvent::Established(profile));
    }

    /// Drop all session state. Returns whether a session was active.
    async fn teardown(&self) -> bool {
        let previous = {
            let mut session = self.session.write().await;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            session.take()
        };

        self.cache.purge(&Tag::SESSION_SCOPED).await;
        self.clear_store().await;
        self.snapshot.send_replace(SessionSnapshot::anonymous());

        previous.is_some()
    }

    async fn clear_store(&self) {
        if let Err(e) = self.store.clear().await {
            warn!("Failed to clear persisted tokens: {}", e);
        }
    }
}
