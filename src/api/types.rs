use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type BookId = u64;
pub type UserId = u64;
pub type BorrowId = u64;
pub type ReviewId = u64;

/// Bearer credential attached to authenticated requests.
///
/// `Debug` is redacted so tokens never reach logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Token pair issued by the login endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &self.access_token)
            .field("refresh_token", &"***")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Account profile as returned by `/auth/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// Partial profile update; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Borrowed,
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookStatus::Available => f.write_str("available"),
            BookStatus::Borrowed => f.write_str("borrowed"),
        }
    }
}

/// Progress of the service-side summarization job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub published_year: Option<i32>,
    pub file_url: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_review_consensus: Option<String>,
    pub summary_status: SummaryStatus,
    pub average_rating: f64,
    pub review_count: u32,
    pub status: BookStatus,
    pub created_at: DateTime<Utc>,
}

/// One page of the book catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookPage {
    pub items: Vec<Book>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl BookPage {
    pub fn find(&self, book_id: BookId) -> Option<&Book> {
        self.items.iter().find(|book| book.id == book_id)
    }
}

/// Catalogue listing parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookQuery {
    pub page: u32,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl BookQuery {
    pub fn page(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, crate::env::api::MAX_PAGE_SIZE),
            genre: None,
        }
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }
}

impl Default for BookQuery {
    fn default() -> Self {
        Self::page(1, crate::env::api::DEFAULT_PAGE_SIZE)
    }
}

/// Opaque file payload for uploads
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub published_year: Option<i32>,
    pub file: UploadFile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Active,
    Returned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Borrow {
    pub id: BorrowId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub status: BorrowStatus,
    #[serde(alias = "borrowed_date")]
    pub borrowed_at: DateTime<Utc>,
    #[serde(default, alias = "return_date")]
    pub returned_at: Option<DateTime<Utc>>,
}

impl Borrow {
    pub fn is_active(&self) -> bool {
        self.status == BorrowStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub rating: u8,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub rating: u8,
    pub body: String,
    pub sentiment_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Service-generated summary and review consensus for a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookAnalysis {
    pub book_id: BookId,
    pub ai_summary: Option<String>,
    pub ai_review_consensus: Option<String>,
    pub average_rating: f64,
    pub review_count: u32,
}

/// Recommended books plus the label of the strategy that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub books: Vec<Book>,
    pub strategy: String,
}
