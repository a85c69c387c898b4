use super::memory::ops;
use super::*;

async fn seeded_library() -> (InMemoryLibrary, UserId, BookId) {
    let library = InMemoryLibrary::new();
    let user_id = library.add_user("u@example.com", "pw", "reader").await;
    let book_id = library.add_book("Dune", "Frank Herbert").await;
    (library, user_id, book_id)
}

async fn login(library: &InMemoryLibrary) -> AccessToken {
    library
        .login(&LoginRequest {
            email: "u@example.com".to_string(),
            password: "pw".to_string(),
        })
        .await
        .unwrap()
        .access_token
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let (library, _, _) = seeded_library().await;

    let result = library
        .login(&LoginRequest {
            email: "u@example.com".to_string(),
            password: "wrong".to_string(),
        })
        .await;

    assert_eq!(
        result.unwrap_err(),
        ApiError::AuthDenied("Invalid credentials".to_string())
    );
}

#[tokio::test]
async fn test_borrow_and_return_flip_book_status() {
    let (library, user_id, book_id) = seeded_library().await;
    let token = login(&library).await;

    let borrow = library.borrow(&token, book_id).await.unwrap();
    assert_eq!(borrow.user_id, user_id);
    assert_eq!(library.book(book_id).await.unwrap().status, BookStatus::Borrowed);

    let active = library.borrowed_books(&token, user_id).await.unwrap();
    assert_eq!(active.len(), 1);

    let returned = library.return_book(&token, book_id).await.unwrap();
    assert_eq!(returned.status, BorrowStatus::Returned);
    assert_eq!(library.book(book_id).await.unwrap().status, BookStatus::Available);
    assert!(library.borrowed_books(&token, user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_borrower_loses_race() {
    let (library, _, book_id) = seeded_library().await;
    let other = library.add_user("o@example.com", "pw", "other").await;
    let token = login(&library).await;

    library.borrow_as(other, book_id).await.unwrap();
    let result = library.borrow(&token, book_id).await;

    assert_eq!(
        result.unwrap_err(),
        ApiError::Validation("Book is currently borrowed".to_string())
    );
}

#[tokio::test]
async fn test_review_requires_active_borrow() {
    let (library, _, book_id) = seeded_library().await;
    let token = login(&library).await;
    let review = NewReview {
        rating: 4,
        body: "A sweeping desert epic.".to_string(),
    };

    let denied = library.submit_review(&token, book_id, &review).await;
    assert!(matches!(denied, Err(ApiError::Validation(_))));

    library.borrow(&token, book_id).await.unwrap();
    let created = library.submit_review(&token, book_id, &review).await.unwrap();
    assert_eq!(created.rating, 4);

    let analysis = library.fetch_analysis(None, book_id).await.unwrap();
    assert_eq!(analysis.review_count, 1);
    assert_eq!(analysis.average_rating, 4.0);
}

#[tokio::test]
async fn test_revoked_token_is_denied() {
    let (library, _, _) = seeded_library().await;
    let token = login(&library).await;

    library.revoke_all_tokens().await;
    let result = library.fetch_profile(&token).await;

    assert!(result.unwrap_err().is_auth_denied());
}

#[tokio::test]
async fn test_injected_failure_is_one_shot_and_counted() {
    let (library, _, _) = seeded_library().await;
    library.fail_next(ops::LIST_BOOKS, ApiError::Transport("timed out".to_string()));

    let first = library.list_books(None, &BookQuery::default()).await;
    let second = library.list_books(None, &BookQuery::default()).await;

    assert!(first.unwrap_err().is_transient());
    assert_eq!(second.unwrap().total, 1);
    assert_eq!(library.calls(ops::LIST_BOOKS), 2);
}

#[tokio::test]
async fn test_list_books_pages_and_filters() {
    let library = InMemoryLibrary::new();
    let token = {
        library.add_user("u@example.com", "pw", "reader").await;
        login(&library).await
    };
    for i in 0..5 {
        let file = UploadFile {
            file_name: format!("book-{}.txt", i),
            content_type: "text/plain".to_string(),
            bytes: b"chapter one".to_vec(),
        };
        library
            .create_book(
                &token,
                &NewBook {
                    title: format!("Book {}", i),
                    author: "Anon".to_string(),
                    isbn: None,
                    description: None,
                    genre: Some(if i % 2 == 0 { "sf" } else { "poetry" }.to_string()),
                    published_year: None,
                    file,
                },
            )
            .await
            .unwrap();
    }

    let page = library.list_books(None, &BookQuery::page(2, 2)).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].title, "Book 2");

    let sf = library
        .list_books(None, &BookQuery::page(1, 20).with_genre("sf"))
        .await
        .unwrap();
    assert_eq!(sf.total, 3);
}

#[tokio::test]
async fn test_page_far_past_the_end_is_empty() {
    let (library, _, _) = seeded_library().await;

    let page = library
        .list_books(None, &BookQuery::page(u32::MAX, crate::env::api::MAX_PAGE_SIZE))
        .await
        .unwrap();

    assert_eq!(page.total, 1);
    assert!(page.items.is_empty());
    assert_eq!(page.page, u32::MAX);
}
