//! In-process library service.
//!
//! Mirrors the remote service's observable behavior (status codes, messages,
//! borrow/review rules) closely enough to drive the client offline and in
//! tests. Every operation is counted so callers can assert how many network
//! round-trips a client flow produced.

use crate::api::error::{ApiError, ApiResult};
use crate::api::provider::LibraryApi;
use crate::api::types::*;
use crate::env;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Operation names used for call counting and failure injection
pub mod ops {
    pub const LOGIN: &str = "login";
    pub const SIGNUP: &str = "signup";
    pub const FETCH_PROFILE: &str = "fetch_profile";
    pub const UPDATE_PROFILE: &str = "update_profile";
    pub const SIGNOUT: &str = "signout";
    pub const LIST_BOOKS: &str = "list_books";
    pub const CREATE_BOOK: &str = "create_book";
    pub const UPDATE_BOOK: &str = "update_book";
    pub const DELETE_BOOK: &str = "delete_book";
    pub const BORROWED_BOOKS: &str = "borrowed_books";
    pub const BORROW: &str = "borrow";
    pub const RETURN_BOOK: &str = "return_book";
    pub const SUBMIT_REVIEW: &str = "submit_review";
    pub const FETCH_ANALYSIS: &str = "fetch_analysis";
    pub const FETCH_RECOMMENDATIONS: &str = "fetch_recommendations";
}

#[derive(Debug)]
struct Account {
    user: User,
    password: String,
}

#[derive(Debug, Default)]
struct LibraryState {
    accounts: Vec<Account>,
    tokens: HashMap<String, UserId>,
    books: BTreeMap<BookId, Book>,
    borrows: Vec<Borrow>,
    reviews: Vec<Review>,
    next_id: u64,
}

impl LibraryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn authenticate(&self, token: &AccessToken) -> ApiResult<UserId> {
        self.tokens
            .get(token.as_str())
            .copied()
            .ok_or_else(|| ApiError::AuthDenied("Could not validate credentials".to_string()))
    }

    fn account(&self, user_id: UserId) -> ApiResult<&Account> {
        self.accounts
            .iter()
            .find(|account| account.user.id == user_id)
            .ok_or_else(|| ApiError::AuthDenied("User not found".to_string()))
    }

    fn book_mut(&mut self, book_id: BookId) -> ApiResult<&mut Book> {
        self.books
            .get_mut(&book_id)
            .ok_or_else(|| ApiError::Validation("Book not found".to_string()))
    }

    fn active_borrow_mut(&mut self, user_id: UserId, book_id: BookId) -> Option<&mut Borrow> {
        self.borrows
            .iter_mut()
            .find(|b| b.user_id == user_id && b.book_id == book_id && b.is_active())
    }

    fn issue_tokens(&mut self, user_id: UserId) -> TokenPair {
        let access = format!("access-{}", Uuid::new_v4());
        self.tokens.insert(access.clone(), user_id);
        TokenPair {
            access_token: AccessToken::new(access),
            refresh_token: format!("refresh-{}", Uuid::new_v4()),
            token_type: "bearer".to_string(),
        }
    }
}

/// In-memory [`LibraryApi`] implementation
pub struct InMemoryLibrary {
    state: Mutex<LibraryState>,
    calls: DashMap<&'static str, usize>,
    injected: DashMap<&'static str, ApiError>,
    latency: Option<Duration>,
}

impl Default for InMemoryLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LibraryState::default()),
            calls: DashMap::new(),
            injected: DashMap::new(),
            latency: None,
        }
    }

    /// Delay every operation, keeping requests in flight long enough to overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register an account and return its user id
    pub async fn add_user(&self, email: &str, password: &str, username: &str) -> UserId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.accounts.push(Account {
            user: User {
                id,
                email: email.to_string(),
                username: username.to_string(),
                full_name: None,
                bio: None,
                is_active: true,
            },
            password: password.to_string(),
        });
        id
    }

    /// Add an available book to the catalogue
    pub async fn add_book(&self, title: &str, author: &str) -> BookId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.books.insert(id, new_book(id, title, author));
        id
    }

    /// Borrow a book on behalf of another user, bypassing the client
    pub async fn borrow_as(&self, user_id: UserId, book_id: BookId) -> ApiResult<Borrow> {
        let mut state = self.state.lock().await;
        borrow_book(&mut state, user_id, book_id)
    }

    /// Invalidate every issued access token
    pub async fn revoke_all_tokens(&self) {
        self.state.lock().await.tokens.clear();
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: &'static str, error: ApiError) {
        self.injected.insert(op, error);
    }

    /// Number of times `op` reached the service
    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op).map(|count| *count).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    pub async fn book(&self, book_id: BookId) -> Option<Book> {
        self.state.lock().await.books.get(&book_id).cloned()
    }

    async fn enter(&self, op: &'static str) -> ApiResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        debug!("in-memory library: {}", op);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.injected.remove(op) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}

fn new_book(id: BookId, title: &str, author: &str) -> Book {
    Book {
        id,
        title: title.to_string(),
        author: author.to_string(),
        isbn: None,
        description: None,
        genre: None,
        published_year: None,
        file_url: None,
        ai_summary: None,
        ai_review_consensus: None,
        summary_status: SummaryStatus::Pending,
        average_rating: 0.0,
        review_count: 0,
        status: BookStatus::Available,
        created_at: Utc::now(),
    }
}

fn borrow_book(state: &mut LibraryState, user_id: UserId, book_id: BookId) -> ApiResult<Borrow> {
    let book = state.book_mut(book_id)?;
    if book.status != BookStatus::Available {
        return Err(ApiError::Validation("Book is currently borrowed".to_string()));
    }
    book.status = BookStatus::Borrowed;

    let borrow = Borrow {
        id: state.next_id(),
        user_id,
        book_id,
        status: BorrowStatus::Active,
        borrowed_at: Utc::now(),
        returned_at: None,
    };
    state.borrows.push(borrow.clone());
    Ok(borrow)
}

#[async_trait]
impl LibraryApi for InMemoryLibrary {
    async fn login(&self, request: &LoginRequest) -> ApiResult<TokenPair> {
        self.enter(ops::LOGIN).await?;
        let mut state = self.state.lock().await;

        let (user_id, is_active) = state
            .accounts
            .iter()
            .find(|a| a.user.email == request.email && a.password == request.password)
            .map(|a| (a.user.id, a.user.is_active))
            .ok_or_else(|| ApiError::AuthDenied("Invalid credentials".to_string()))?;
        if !is_active {
            return Err(ApiError::Validation("Account deactivated".to_string()));
        }

        Ok(state.issue_tokens(user_id))
    }

    async fn signup(&self, request: &SignupRequest) -> ApiResult<User> {
        self.enter(ops::SIGNUP).await?;
        let mut state = self.state.lock().await;

        if state.accounts.iter().any(|a| a.user.email == request.email) {
            return Err(ApiError::Validation("Email already registered".to_string()));
        }
        if state.accounts.iter().any(|a| a.user.username == request.username) {
            return Err(ApiError::Validation("Username taken".to_string()));
        }

        let id = state.next_id();
        let user = User {
            id,
            email: request.email.clone(),
            username: request.username.clone(),
            full_name: request.full_name.clone(),
            bio: None,
            is_active: true,
        };
        state.accounts.push(Account {
            user: user.clone(),
            password: request.password.clone(),
        });
        Ok(user)
    }

    async fn fetch_profile(&self, token: &AccessToken) -> ApiResult<User> {
        self.enter(ops::FETCH_PROFILE).await?;
        let state = self.state.lock().await;
        let user_id = state.authenticate(token)?;
        Ok(state.account(user_id)?.user.clone())
    }

    async fn update_profile(&self, token: &AccessToken, update: &ProfileUpdate) -> ApiResult<User> {
        self.enter(ops::UPDATE_PROFILE).await?;
        let mut state = self.state.lock().await;
        let user_id = state.authenticate(token)?;

        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.user.id == user_id)
            .ok_or_else(|| ApiError::AuthDenied("User not found".to_string()))?;
        if let Some(full_name) = &update.full_name {
            account.user.full_name = Some(full_name.clone());
        }
        if let Some(bio) = &update.bio {
            account.user.bio = Some(bio.clone());
        }
        if let Some(password) = &update.password {
            account.password = password.clone();
        }
        Ok(account.user.clone())
    }

    async fn signout(&self, token: &AccessToken) -> ApiResult<()> {
        self.enter(ops::SIGNOUT).await?;
        let state = self.state.lock().await;
        state.authenticate(token)?;
        Ok(())
    }

    async fn list_books(&self, _token: Option<&AccessToken>, query: &BookQuery) -> ApiResult<BookPage> {
        self.enter(ops::LIST_BOOKS).await?;
        let state = self.state.lock().await;

        let matching: Vec<&Book> = state
            .books
            .values()
            .filter(|book| match &query.genre {
                Some(genre) => book.genre.as_deref() == Some(genre.as_str()),
                None => true,
            })
            .collect();
        let skip = (query.page as usize)
            .saturating_sub(1)
            .saturating_mul(query.page_size as usize);

        Ok(BookPage {
            total: matching.len() as u64,
            items: matching
                .into_iter()
                .skip(skip)
                .take(query.page_size as usize)
                .cloned()
                .collect(),
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn create_book(&self, token: &AccessToken, book: &NewBook) -> ApiResult<Book> {
        self.enter(ops::CREATE_BOOK).await?;
        let mut state = self.state.lock().await;
        state.authenticate(token)?;

        if !matches!(book.file.content_type.as_str(), "application/pdf" | "text/plain") {
            return Err(ApiError::Validation("Only PDF or plain text accepted".to_string()));
        }

        let id = state.next_id();
        let mut created = new_book(id, &book.title, &book.author);
        created.isbn = book.isbn.clone();
        created.description = book.description.clone();
        created.genre = book.genre.clone();
        created.published_year = book.published_year;
        created.file_url = Some(format!("memory://books/{}/{}", id, book.file.file_name));
        state.books.insert(id, created.clone());
        Ok(created)
    }

    async fn update_book(
        &self,
        token: &AccessToken,
        book_id: BookId,
        update: &BookUpdate,
    ) -> ApiResult<Book> {
        self.enter(ops::UPDATE_BOOK).await?;
        let mut state = self.state.lock().await;
        state.authenticate(token)?;

        let book = state.book_mut(book_id)?;
        if let Some(title) = &update.title {
            book.title = title.clone();
        }
        if let Some(author) = &update.author {
            book.author = author.clone();
        }
        if let Some(description) = &update.description {
            book.description = Some(description.clone());
        }
        if let Some(genre) = &update.genre {
            book.genre = Some(genre.clone());
        }
        if let Some(year) = update.published_year {
            book.published_year = Some(year);
        }
        Ok(book.clone())
    }

    async fn delete_book(&self, token: &AccessToken, book_id: BookId) -> ApiResult<()> {
        self.enter(ops::DELETE_BOOK).await?;
        let mut state = self.state.lock().await;
        state.authenticate(token)?;

        state
            .books
            .remove(&book_id)
            .map(|_| ())
            .ok_or_else(|| ApiError::Validation("Book not found".to_string()))
    }

    async fn borrowed_books(&self, token: &AccessToken, user_id: UserId) -> ApiResult<Vec<Borrow>> {
        self.enter(ops::BORROWED_BOOKS).await?;
        let state = self.state.lock().await;
        let caller = state.authenticate(token)?;
        if caller != user_id {
            return Err(ApiError::Validation("Cannot view other user's borrows".to_string()));
        }

        let mut active: Vec<Borrow> = state
            .borrows
            .iter()
            .filter(|b| b.user_id == user_id && b.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at));
        Ok(active)
    }

    async fn borrow(&self, token: &AccessToken, book_id: BookId) -> ApiResult<Borrow> {
        self.enter(ops::BORROW).await?;
        let mut state = self.state.lock().await;
        let user_id = state.authenticate(token)?;

        if state.active_borrow_mut(user_id, book_id).is_some() {
            return Err(ApiError::Validation(
                "You already have this book borrowed".to_string(),
            ));
        }
        borrow_book(&mut state, user_id, book_id)
    }

    async fn return_book(&self, token: &AccessToken, book_id: BookId) -> ApiResult<Borrow> {
        self.enter(ops::RETURN_BOOK).await?;
        let mut state = self.state.lock().await;
        let user_id = state.authenticate(token)?;

        let borrow = state.active_borrow_mut(user_id, book_id).ok_or_else(|| {
            ApiError::Validation("No active borrow found for this book".to_string())
        })?;
        borrow.status = BorrowStatus::Returned;
        borrow.returned_at = Some(Utc::now());
        let returned = borrow.clone();

        if let Some(book) = state.books.get_mut(&book_id) {
            book.status = BookStatus::Available;
        }
        Ok(returned)
    }

    async fn submit_review(
        &self,
        token: &AccessToken,
        book_id: BookId,
        review: &NewReview,
    ) -> ApiResult<Review> {
        self.enter(ops::SUBMIT_REVIEW).await?;
        let mut state = self.state.lock().await;
        let user_id = state.authenticate(token)?;

        if !(env::review::MIN_RATING..=env::review::MAX_RATING).contains(&review.rating) {
            return Err(ApiError::Validation("rating must be between 1 and 5".to_string()));
        }
        if review.body.chars().count() < env::review::MIN_BODY_CHARS {
            return Err(ApiError::Validation(
                "body should have at least 10 characters".to_string(),
            ));
        }
        if state.active_borrow_mut(user_id, book_id).is_none() {
            return Err(ApiError::Validation(
                "You must borrow a book before reviewing it".to_string(),
            ));
        }

        let id = state.next_id();
        let created = Review {
            id,
            book_id,
            user_id,
            rating: review.rating,
            body: review.body.clone(),
            sentiment_score: None,
            created_at: Utc::now(),
        };
        state.reviews.push(created.clone());

        let ratings: Vec<f64> = state
            .reviews
            .iter()
            .filter(|r| r.book_id == book_id)
            .map(|r| f64::from(r.rating))
            .collect();
        let book = state.book_mut(book_id)?;
        book.review_count = ratings.len() as u32;
        book.average_rating = ratings.iter().sum::<f64>() / ratings.len() as f64;

        Ok(created)
    }

    async fn fetch_analysis(&self, _token: Option<&AccessToken>, book_id: BookId) -> ApiResult<BookAnalysis> {
        self.enter(ops::FETCH_ANALYSIS).await?;
        let state = self.state.lock().await;
        let book = state
            .books
            .get(&book_id)
            .ok_or_else(|| ApiError::Validation("Book not found".to_string()))?;

        Ok(BookAnalysis {
            book_id,
            ai_summary: book.ai_summary.clone(),
            ai_review_consensus: book.ai_review_consensus.clone(),
            average_rating: book.average_rating,
            review_count: book.review_count,
        })
    }

    async fn fetch_recommendations(&self, token: &AccessToken) -> ApiResult<Recommendations> {
        self.enter(ops::FETCH_RECOMMENDATIONS).await?;
        let state = self.state.lock().await;
        let user_id = state.authenticate(token)?;

        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|book| {
                book.status == BookStatus::Available
                    && !state
                        .borrows
                        .iter()
                        .any(|b| b.user_id == user_id && b.book_id == book.id)
            })
            .cloned()
            .collect();
        books.sort_by(|a, b| b.average_rating.total_cmp(&a.average_rating));
        books.truncate(10);

        Ok(Recommendations {
            books,
            strategy: "top_rated".to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
