use crate::api::memory::ops;
use crate::api::{AccessToken, ApiError, InMemoryLibrary, ProfileUpdate, TokenPair};
use crate::client::{ClientOptions, LibraryClient};
use crate::error::SyncError;
use crate::session::*;
use crate::storage::{MemoryTokenStore, TokenStore};
use std::sync::Arc;

struct Fixture {
    library: Arc<InMemoryLibrary>,
    store: Arc<MemoryTokenStore>,
    client: LibraryClient,
}

impl Fixture {
    async fn new() -> Self {
        let library = Arc::new(InMemoryLibrary::new());
        library.add_user("u@example.com", "pw", "reader").await;
        library.add_book("Dune", "Frank Herbert").await;
        Self::with_store(library, Arc::new(MemoryTokenStore::new()))
    }

    fn with_store(library: Arc<InMemoryLibrary>, store: Arc<MemoryTokenStore>) -> Self {
        let client = LibraryClient::new(library.clone(), store.clone(), ClientOptions::default());
        Self {
            library,
            store,
            client,
        }
    }

    fn session(&self) -> &Arc<SessionManager> {
        self.client.session()
    }
}

#[tokio::test]
async fn test_login_persists_tokens_and_establishes_session() {
    let fixture = Fixture::new().await;
    let mut events = fixture.session().events();

    let user = fixture.session().login("u@example.com", "pw").await.unwrap();

    assert_eq!(user.id, 1);
    assert!(fixture.store.load().await.unwrap().is_some());
    assert!(fixture.session().is_authenticated());
    assert_eq!(fixture.session().current_user(), Some(user.clone()));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Established(user));

    let snapshot = fixture.session().session_state().borrow().clone();
    assert!(snapshot.authenticated);
    assert!(!snapshot.restoring);
}

#[tokio::test]
async fn test_wrong_password_is_validation_failure() {
    let fixture = Fixture::new().await;

    let error = fixture.session().login("u@example.com", "nope").await.unwrap_err();

    assert_eq!(
        error,
        SyncError::Api(ApiError::Validation("Invalid credentials".to_string()))
    );
    assert!(!fixture.session().is_authenticated());
    assert!(fixture.store.load().await.unwrap().is_none());
    assert_eq!(fixture.library.calls(ops::FETCH_PROFILE), 0);
}

#[tokio::test]
async fn test_failed_profile_fetch_clears_stored_tokens() {
    let fixture = Fixture::new().await;
    fixture
        .library
        .fail_next(ops::FETCH_PROFILE, ApiError::Server("Internal Server Error".to_string()));

    let result = fixture.session().login("u@example.com", "pw").await;

    assert!(result.is_err());
    assert!(!fixture.session().is_authenticated());
    assert!(fixture.store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_initialize_restores_persisted_session() {
    let fixture = Fixture::new().await;
    fixture.session().login("u@example.com", "pw").await.unwrap();

    let restarted = Fixture::with_store(fixture.library.clone(), fixture.store.clone());
    assert!(!restarted.session().is_authenticated());

    let user = restarted.session().initialize().await.unwrap();
    assert_eq!(user.email, "u@example.com");
    assert!(restarted.session().is_authenticated());
    assert!(!restarted.session().session_state().borrow().restoring);
}

#[tokio::test]
async fn test_initialize_with_stale_token_signs_out_quietly() {
    let library = Arc::new(InMemoryLibrary::new());
    library.add_user("u@example.com", "pw", "reader").await;
    let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair {
        access_token: AccessToken::new("access-expired"),
        refresh_token: "refresh-expired".to_string(),
        token_type: "bearer".to_string(),
    }));
    let fixture = Fixture::with_store(library, store);
    let mut events = fixture.session().events();

    assert!(fixture.session().initialize().await.is_none());

    assert!(!fixture.session().is_authenticated());
    assert!(fixture.store.load().await.unwrap().is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_logout_completes_when_remote_signout_fails() {
    let fixture = Fixture::new().await;
    fixture.session().login("u@example.com", "pw").await.unwrap();
    let mut events = fixture.session().events();
    fixture
        .library
        .fail_next(ops::SIGNOUT, ApiError::Transport("connection refused".to_string()));

    fixture.session().logout().await;

    assert!(!fixture.session().is_authenticated());
    assert!(fixture.session().current_user().is_none());
    assert!(fixture.session().access_token().await.is_none());
    assert!(fixture.store.load().await.unwrap().is_none());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::SignedOut);
}

#[tokio::test]
async fn test_auth_denial_forces_logout() {
    let fixture = Fixture::new().await;
    fixture.session().login("u@example.com", "pw").await.unwrap();
    let mut events = fixture.session().events();
    fixture.library.revoke_all_tokens().await;

    let error = fixture
        .session()
        .authorized(|api, token| async move { api.fetch_recommendations(&token).await })
        .await
        .unwrap_err();

    assert!(error.is_auth_denied());
    assert!(!fixture.session().is_authenticated());
    assert!(fixture.store.load().await.unwrap().is_none());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Expired {
            reason: "Could not validate credentials".to_string()
        }
    );
    // Forced logout never presents the dead credential again.
    assert_eq!(fixture.library.calls(ops::SIGNOUT), 0);

    let calls_before = fixture.library.total_calls();
    let retry = fixture
        .session()
        .authorized(|api, token| async move { api.fetch_recommendations(&token).await })
        .await;
    assert_eq!(retry.unwrap_err(), SyncError::Unauthenticated);
    assert_eq!(fixture.library.total_calls(), calls_before);
}

#[tokio::test]
async fn test_optional_call_without_session_never_expires() {
    let fixture = Fixture::new().await;
    let mut events = fixture.session().events();
    fixture
        .library
        .fail_next(ops::FETCH_ANALYSIS, ApiError::AuthDenied("Not authenticated".to_string()));

    let result = fixture
        .session()
        .optional(|api, token| async move { api.fetch_analysis(token.as_ref(), 2).await })
        .await;

    assert!(result.unwrap_err().is_auth_denied());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_denial_from_previous_session_is_ignored() {
    let fixture = Fixture::new().await;
    fixture.session().login("u@example.com", "pw").await.unwrap();

    let session = Arc::clone(fixture.session());
    let library = fixture.library.clone();
    let result = fixture
        .session()
        .authorized(move |api, token| async move {
            // The credential dies and a new session starts while this call is out.
            library.revoke_all_tokens().await;
            session.login("u@example.com", "pw").await.unwrap();
            api.fetch_recommendations(&token).await
        })
        .await;

    assert!(result.unwrap_err().is_auth_denied());
    assert!(fixture.session().is_authenticated());
    assert!(fixture.store.load().await.unwrap().is_some());
}

#[tokio::test]
async fn test_update_profile_refreshes_snapshot() {
    let fixture = Fixture::new().await;
    fixture.session().login("u@example.com", "pw").await.unwrap();
    let epoch = fixture.session().epoch();

    let update = ProfileUpdate {
        bio: Some("Reads mostly science fiction".to_string()),
        ..Default::default()
    };
    let user = fixture.session().update_profile(&update).await.unwrap();

    assert_eq!(user.bio.as_deref(), Some("Reads mostly science fiction"));
    assert_eq!(fixture.session().current_user(), Some(user));
    assert_eq!(fixture.session().epoch(), epoch);
}

#[tokio::test]
async fn test_second_login_replaces_session() {
    let fixture = Fixture::new().await;
    fixture.library.add_user("o@example.com", "pw2", "other").await;
    fixture.session().login("u@example.com", "pw").await.unwrap();
    let first_epoch = fixture.session().epoch();

    let other = fixture.session().login("o@example.com", "pw2").await.unwrap();

    assert_eq!(fixture.session().user_id(), Some(other.id));
    assert!(fixture.session().epoch() > first_epoch);
}
