use crate::api::memory::ops;
use crate::api::{ApiError, BookId, BookStatus, InMemoryLibrary, NewBook, UploadFile, UserId};
use crate::client::{ClientOptions, LibraryClient};
use crate::error::SyncError;
use crate::mutation::*;
use crate::storage::MemoryTokenStore;
use std::sync::Arc;
use std::time::Duration;

async fn signed_in(library: InMemoryLibrary) -> (Arc<InMemoryLibrary>, LibraryClient, UserId, BookId) {
    let library = Arc::new(library);
    let user_id = library.add_user("u@example.com", "pw", "reader").await;
    let book_id = library.add_book("Dune", "Frank Herbert").await;

    let client = LibraryClient::new(
        library.clone(),
        Arc::new(MemoryTokenStore::new()),
        ClientOptions::default(),
    );
    client.login("u@example.com", "pw").await.unwrap();
    (library, client, user_id, book_id)
}

fn text_upload(title: &str, bytes: &[u8]) -> NewBook {
    NewBook {
        title: title.to_string(),
        author: "Ursula K. Le Guin".to_string(),
        isbn: None,
        description: None,
        genre: Some("sf".to_string()),
        published_year: Some(1969),
        file: UploadFile {
            file_name: "book.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: bytes.to_vec(),
        },
    }
}

#[tokio::test]
async fn test_duplicate_borrow_is_rejected_client_side() {
    let (library, client, _, book_id) =
        signed_in(InMemoryLibrary::new().with_latency(Duration::from_millis(20))).await;

    let (first, second) = tokio::join!(client.borrow(book_id), client.borrow(book_id));

    assert!(matches!(first, Ok(MutationOutput::Borrowed(_))));
    let error = second.unwrap_err();
    assert_eq!(
        error,
        SyncError::MutationInFlight {
            kind: MutationKind::Borrow,
            target: "book 2".to_string(),
        }
    );
    assert!(error.to_string().contains("mutation in flight"));
    assert_eq!(library.calls(ops::BORROW), 1);
}

#[tokio::test]
async fn test_different_targets_run_concurrently() {
    let (library, client, _, book_id) =
        signed_in(InMemoryLibrary::new().with_latency(Duration::from_millis(10))).await;
    let other = library.add_book("Hyperion", "Dan Simmons").await;

    let (first, second) = tokio::join!(client.borrow(book_id), client.borrow(other));

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(library.calls(ops::BORROW), 2);
}

#[tokio::test]
async fn test_review_requires_membership() {
    let (library, client, _, book_id) = signed_in(InMemoryLibrary::new()).await;
    let mut events = client.mutation_events();
    let calls_before = library.total_calls();

    let error = client.review(book_id, 5, "short").await.unwrap_err();

    assert_eq!(error, SyncError::ReviewNotPermitted(book_id));
    assert_eq!(library.total_calls(), calls_before);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_review_input_is_checked_before_dispatch() {
    let (_, client, _, book_id) = signed_in(InMemoryLibrary::new()).await;
    client.borrow(book_id).await.unwrap();

    let bad_rating = client.review(book_id, 6, "A sweeping desert epic").await;
    let short_body = client.review(book_id, 4, "short").await;

    assert!(matches!(bad_rating, Err(SyncError::InvalidInput(_))));
    assert!(matches!(short_body, Err(SyncError::InvalidInput(_))));
}

#[tokio::test]
async fn test_review_commit_invalidates_analysis() {
    let (library, client, _, book_id) = signed_in(InMemoryLibrary::new()).await;
    client.borrow(book_id).await.unwrap();
    let before = client.fetch_analysis(book_id).await.unwrap();
    assert_eq!(before.review_count, 0);

    let output = client.review(book_id, 5, "A sweeping desert epic").await.unwrap();
    assert!(matches!(output, MutationOutput::Reviewed(_)));

    let after = client.fetch_analysis(book_id).await.unwrap();
    assert_eq!(after.review_count, 1);
    assert_eq!(library.calls(ops::FETCH_ANALYSIS), 2);
}

#[tokio::test]
async fn test_failed_mutation_leaves_state_untouched() {
    let (library, client, _, book_id) = signed_in(InMemoryLibrary::new()).await;
    let mut events = client.mutation_events();
    let refreshes = library.calls(ops::BORROWED_BOOKS);
    library.fail_next(ops::BORROW, ApiError::Server("Internal Server Error".to_string()));

    let error = client.borrow(book_id).await.unwrap_err();

    assert_eq!(error.user_message("Could not borrow book."), "Could not borrow book.");
    assert!(!client.holds(book_id).await);
    assert_eq!(library.calls(ops::BORROWED_BOOKS), refreshes);
    assert!(client.executor().pending().is_empty());

    let pending = events.try_recv().unwrap();
    let failed = events.try_recv().unwrap();
    assert_eq!(pending.state, IntentState::Pending);
    assert_eq!(failed.state, IntentState::Failed);
    assert_eq!(failed.intent, pending.intent);
    assert_eq!(failed.error, Some(error));

    // The failure released the (kind, target) slot.
    client.borrow(book_id).await.unwrap();
    assert!(client.holds(book_id).await);
}

#[tokio::test]
async fn test_commit_stands_when_membership_refresh_fails() {
    let (library, client, _, book_id) = signed_in(InMemoryLibrary::new()).await;
    library.fail_next(ops::BORROWED_BOOKS, ApiError::Server("Internal Server Error".to_string()));

    let output = client.borrow(book_id).await.unwrap();

    assert!(matches!(output, MutationOutput::Borrowed(_)));
    assert!(!client.holds(book_id).await);
    assert_eq!(library.book(book_id).await.unwrap().status, BookStatus::Borrowed);

    client.refresh_membership().await.unwrap();
    assert!(client.holds(book_id).await);
}

#[tokio::test]
async fn test_conflict_surfaces_server_message() {
    let (library, client, _, book_id) = signed_in(InMemoryLibrary::new()).await;
    let other = library.add_user("o@example.com", "pw", "other").await;
    library.borrow_as(other, book_id).await.unwrap();

    let error = client.borrow(book_id).await.unwrap_err();

    assert_eq!(error.user_message("Could not borrow book."), "Book is currently borrowed");
    assert!(!client.holds(book_id).await);
}

#[tokio::test]
async fn test_borrow_then_return_clears_membership() {
    let (library, client, _, book_id) = signed_in(InMemoryLibrary::new()).await;

    client.borrow(book_id).await.unwrap();
    assert!(client.holds(book_id).await);
    client.return_book(book_id).await.unwrap();

    assert!(!client.holds(book_id).await);
    let page = client.fetch_books(1, None).await.unwrap();
    assert_eq!(page.find(book_id).unwrap().status, BookStatus::Available);
    assert_eq!(library.book(book_id).await.unwrap().status, BookStatus::Available);
}

#[tokio::test]
async fn test_commit_after_session_change_skips_membership_but_refreshes_catalogue() {
    let (library, client, _, book_id) =
        signed_in(InMemoryLibrary::new().with_latency(Duration::from_millis(30))).await;
    let before = client.fetch_books(1, None).await.unwrap();
    assert_eq!(before.find(book_id).unwrap().status, BookStatus::Available);
    let refreshes = library.calls(ops::BORROWED_BOOKS);

    let (result, ()) = tokio::join!(client.borrow(book_id), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        client.session().expire("test").await;
    });

    assert!(matches!(result, Ok(MutationOutput::Borrowed(_))));
    assert!(client.membership().await.is_empty());
    assert_eq!(library.calls(ops::BORROWED_BOOKS), refreshes);

    // The catalogue is shared, so the acknowledged borrow still shows up.
    let after = client.fetch_books(1, None).await.unwrap();
    assert_eq!(after.find(book_id).unwrap().status, BookStatus::Borrowed);
}

#[tokio::test]
async fn test_commit_after_relogin_refreshes_catalogue() {
    let (library, client, _, book_id) =
        signed_in(InMemoryLibrary::new().with_latency(Duration::from_millis(40))).await;
    client.fetch_books(1, None).await.unwrap();

    let (result, ()) = tokio::join!(client.borrow(book_id), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        client.session().expire("test").await;
        client.login("u@example.com", "pw").await.unwrap();
    });

    assert!(result.is_ok());
    assert_eq!(library.book(book_id).await.unwrap().status, BookStatus::Borrowed);
    let page = client.fetch_books(1, None).await.unwrap();
    assert_eq!(page.find(book_id).unwrap().status, BookStatus::Borrowed);
}

#[tokio::test]
async fn test_mutation_without_session_never_dispatches() {
    let library = Arc::new(InMemoryLibrary::new());
    let book_id = library.add_book("Dune", "Frank Herbert").await;
    let client = LibraryClient::new(library.clone(), Arc::new(MemoryTokenStore::new()), ClientOptions::default());

    let error = client.borrow(book_id).await.unwrap_err();

    assert_eq!(error, SyncError::Unauthenticated);
    assert_eq!(library.total_calls(), 0);
}

#[tokio::test]
async fn test_create_update_delete_book() {
    let (library, client, _, _) = signed_in(InMemoryLibrary::new()).await;

    let created = match client
        .mutate(Mutation::CreateBook(text_upload("The Left Hand of Darkness", b"Winter")))
        .await
        .unwrap()
    {
        MutationOutput::Created(book) => book,
        other => panic!("Expected created book, got {:?}", other),
    };
    assert_eq!(client.fetch_books(1, None).await.unwrap().total, 2);

    let update = crate::api::BookUpdate {
        title: Some("The Dispossessed".to_string()),
        ..Default::default()
    };
    client
        .mutate(Mutation::UpdateBook {
            book_id: created.id,
            update,
        })
        .await
        .unwrap();
    assert_eq!(library.book(created.id).await.unwrap().title, "The Dispossessed");

    let output = client.mutate(Mutation::DeleteBook(created.id)).await.unwrap();
    assert_eq!(output, MutationOutput::Deleted(created.id));
    assert_eq!(client.fetch_books(1, None).await.unwrap().total, 1);
    assert_eq!(library.calls(ops::LIST_BOOKS), 2);
}

#[tokio::test]
async fn test_create_book_requires_file() {
    let (library, client, _, _) = signed_in(InMemoryLibrary::new()).await;

    let result = client
        .mutate(Mutation::CreateBook(text_upload("Empty", b"")))
        .await;

    assert!(matches!(result, Err(SyncError::InvalidInput(_))));
    assert_eq!(library.calls(ops::CREATE_BOOK), 0);
}

#[test]
fn test_invalidation_tags() {
    use crate::cache::Tag;

    assert_eq!(Mutation::Borrow(1).invalidates(), vec![Tag::Books]);
    assert_eq!(Mutation::review(4, 5, "Lovely prose").invalidates(), vec![Tag::BookAnalysis(4)]);
    assert_eq!(Mutation::DeleteBook(2).invalidates(), vec![Tag::Books]);
    assert!(MutationKind::Return.touches_membership());
    assert!(!MutationKind::Review.touches_membership());
}
