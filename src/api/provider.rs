use crate::api::error::ApiResult;
use crate::api::types::*;
use async_trait::async_trait;

/// Remote library service capability.
///
/// Implementations only move requests and classify failures; they hold no
/// session state. Callers pass the bearer credential explicitly on every
/// authenticated call.
#[async_trait]
pub trait LibraryApi: Send + Sync {
    /// Exchange credentials for an access/refresh token pair
    async fn login(&self, request: &LoginRequest) -> ApiResult<TokenPair>;

    /// Register a new account
    async fn signup(&self, request: &SignupRequest) -> ApiResult<User>;

    async fn fetch_profile(&self, token: &AccessToken) -> ApiResult<User>;

    async fn update_profile(&self, token: &AccessToken, update: &ProfileUpdate) -> ApiResult<User>;

    async fn signout(&self, token: &AccessToken) -> ApiResult<()>;

    /// List one catalogue page; the credential is optional
    async fn list_books(&self, token: Option<&AccessToken>, query: &BookQuery) -> ApiResult<BookPage>;

    async fn create_book(&self, token: &AccessToken, book: &NewBook) -> ApiResult<Book>;

    async fn update_book(
        &self,
        token: &AccessToken,
        book_id: BookId,
        update: &BookUpdate,
    ) -> ApiResult<Book>;

    async fn delete_book(&self, token: &AccessToken, book_id: BookId) -> ApiResult<()>;

    /// Active borrows of `user_id`; the service only serves the caller's own
    async fn borrowed_books(&self, token: &AccessToken, user_id: UserId) -> ApiResult<Vec<Borrow>>;

    async fn borrow(&self, token: &AccessToken, book_id: BookId) -> ApiResult<Borrow>;

    async fn return_book(&self, token: &AccessToken, book_id: BookId) -> ApiResult<Borrow>;

    async fn submit_review(
        &self,
        token: &AccessToken,
        book_id: BookId,
        review: &NewReview,
    ) -> ApiResult<Review>;

    async fn fetch_analysis(&self, token: Option<&AccessToken>, book_id: BookId) -> ApiResult<BookAnalysis>;

    async fn fetch_recommendations(&self, token: &AccessToken) -> ApiResult<Recommendations>;

    /// Get provider name/identifier
    fn provider_name(&self) -> &'static str;
}
