//! Session persistence through the JSON token file

use shelf::config::ShelfConfig;
use shelf::{ClientOptions, FileTokenStore, InMemoryLibrary, LibraryClient, TokenStore};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_session_survives_restart_through_token_file() {
    let temp_dir = TempDir::new().unwrap();
    let token_file = temp_dir.path().join(".shelf").join("tokens.json");
    let library = Arc::new(InMemoryLibrary::new());
    library.add_user("u@example.com", "pw", "reader").await;

    let client = LibraryClient::new(
        library.clone(),
        Arc::new(FileTokenStore::new(&token_file)),
        ClientOptions::default(),
    );
    client.login("u@example.com", "pw").await.unwrap();
    assert!(token_file.exists());

    let restarted = LibraryClient::new(
        library.clone(),
        Arc::new(FileTokenStore::new(&token_file)),
        ClientOptions::default(),
    );
    let user = restarted.initialize().await.unwrap();
    assert_eq!(user.email, "u@example.com");

    restarted.logout().await;
    assert!(!token_file.exists());
}

#[tokio::test]
async fn test_revoked_token_file_is_cleared_on_start() {
    let temp_dir = TempDir::new().unwrap();
    let token_file = temp_dir.path().join("tokens.json");
    let library = Arc::new(InMemoryLibrary::new());
    library.add_user("u@example.com", "pw", "reader").await;

    let client = LibraryClient::new(
        library.clone(),
        Arc::new(FileTokenStore::new(&token_file)),
        ClientOptions::default(),
    );
    client.login("u@example.com", "pw").await.unwrap();
    library.revoke_all_tokens().await;

    let store = Arc::new(FileTokenStore::new(&token_file));
    let restarted = LibraryClient::new(library.clone(), store.clone(), ClientOptions::default());

    assert!(restarted.initialize().await.is_none());
    assert!(!restarted.is_authenticated());
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_client_from_config_starts_signed_out() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ShelfConfig::default();
    config.storage.token_file = Some(temp_dir.path().join("tokens.json"));

    let client = LibraryClient::from_config(&config).unwrap();

    // No token file means no restore attempt and no request.
    assert!(client.initialize().await.is_none());
    assert!(client.current_user().is_none());
}
