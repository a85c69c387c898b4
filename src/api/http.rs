use crate::api::error::{ApiError, ApiResult};
use crate::api::provider::LibraryApi;
use crate::api::types::*;
use crate::config::ApiConfig;
use crate::env;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// reqwest-backed implementation of [`LibraryApi`]
pub struct HttpLibraryApi {
    client: Client,
    api_root: Url,
}

impl HttpLibraryApi {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let mut base = Url::parse(&config.base_url)
            .map_err(|e| ApiError::Transport(format!("invalid base url {}: {}", config.base_url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api_root = base
            .join(&format!("{}/", env::api::API_PREFIX))
            .map_err(|e| ApiError::Transport(format!("invalid api root: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("shelf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build http client: {}", e)))?;

        Ok(Self { client, api_root })
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    fn request(&self, method: Method, path: &str, token: Option<&AccessToken>) -> ApiResult<RequestBuilder> {
        let url = self
            .api_root
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid endpoint {}: {}", path, e)))?;

        debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        Ok(match token {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, fallback: &str) -> ApiResult<T> {
        let response = Self::check(request.send().await?, fallback).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, request: RequestBuilder, fallback: &str) -> ApiResult<()> {
        Self::check(request.send().await?, fallback).await?;
        Ok(())
    }

    async fn check(response: reqwest::Response, fallback: &str) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_response(status.as_u16(), &body, fallback);
        debug!("request failed with {} ({}): {}", status, error.category(), error);
        Err(error)
    }

    fn upload_form(book: &NewBook) -> ApiResult<Form> {
        let file = Part::bytes(book.file.bytes.clone())
            .file_name(book.file.file_name.clone())
            .mime_str(&book.file.content_type)
            .map_err(|e| ApiError::Validation(format!("invalid content type: {}", e)))?;

        let mut form = Form::new()
            .text("title", book.title.clone())
            .text("author", book.author.clone());
        if let Some(isbn) = &book.isbn {
            form = form.text("isbn", isbn.clone());
        }
        if let Some(description) = &book.description {
            form = form.text("description", description.clone());
        }
        if let Some(genre) = &book.genre {
            form = form.text("genre", genre.clone());
        }
        if let Some(year) = book.published_year {
            form = form.text("published_year", year.to_string());
        }

        Ok(form.part("file", file))
    }
}

#[async_trait]
impl LibraryApi for HttpLibraryApi {
    async fn login(&self, request: &LoginRequest) -> ApiResult<TokenPair> {
        let req = self.request(Method::POST, "auth/login", None)?.json(request);
        self.send(req, "Login failed.").await
    }

    async fn signup(&self, request: &SignupRequest) -> ApiResult<User> {
        let req = self.request(Method::POST, "auth/signup", None)?.json(request);
        self.send(req, "Signup failed.").await
    }

    async fn fetch_profile(&self, token: &AccessToken) -> ApiResult<User> {
        let req = self.request(Method::GET, "auth/me", Some(token))?;
        self.send(req, "Could not load profile.").await
    }

    async fn update_profile(&self, token: &AccessToken, update: &ProfileUpdate) -> ApiResult<User> {
        let req = self.request(Method::PUT, "auth/me", Some(token))?.json(update);
        self.send(req, "Could not update profile.").await
    }

    async fn signout(&self, token: &AccessToken) -> ApiResult<()> {
        let req = self.request(Method::POST, "auth/signout", Some(token))?;
        self.send_empty(req, "Sign out failed.").await
    }

    async fn list_books(&self, token: Option<&AccessToken>, query: &BookQuery) -> ApiResult<BookPage> {
        let req = self.request(Method::GET, "books", token)?.query(query);
        self.send(req, "Could not load books.").await
    }

    async fn create_book(&self, token: &AccessToken, book: &NewBook) -> ApiResult<Book> {
        let form = Self::upload_form(book)?;
        let req = self.request(Method::POST, "books", Some(token))?.multipart(form);
        self.send(req, "Failed to upload book.").await
    }

    async fn update_book(
        &self,
        token: &AccessToken,
        book_id: BookId,
        update: &BookUpdate,
    ) -> ApiResult<Book> {
        let req = self
            .request(Method::PUT, &format!("books/{}", book_id), Some(token))?
            .json(update);
        self.send(req, "Failed to update book.").await
    }

    async fn delete_book(&self, token: &AccessToken, book_id: BookId) -> ApiResult<()> {
        let req = self.request(Method::DELETE, &format!("books/{}", book_id), Some(token))?;
        self.send_empty(req, "Failed to delete book.").await
    }

    async fn borrowed_books(&self, token: &AccessToken, user_id: UserId) -> ApiResult<Vec<Borrow>> {
        let req = self.request(Method::GET, &format!("books/{}/borrowed", user_id), Some(token))?;
        self.send(req, "Could not load borrowed books.").await
    }

    async fn borrow(&self, token: &AccessToken, book_id: BookId) -> ApiResult<Borrow> {
        let req = self.request(Method::POST, &format!("books/{}/borrow", book_id), Some(token))?;
        self.send(req, "Could not borrow book.").await
    }

    async fn return_book(&self, token: &AccessToken, book_id: BookId) -> ApiResult<Borrow> {
        let req = self.request(Method::POST, &format!("books/{}/return", book_id), Some(token))?;
        self.send(req, "Could not return book.").await
    }

    async fn submit_review(
        &self,
        token: &AccessToken,
        book_id: BookId,
        review: &NewReview,
    ) -> ApiResult<Review> {
        let req = self
            .request(Method::POST, &format!("books/{}/reviews", book_id), Some(token))?
            .json(review);
        self.send(req, "Failed to submit review.").await
    }

    async fn fetch_analysis(&self, token: Option<&AccessToken>, book_id: BookId) -> ApiResult<BookAnalysis> {
        let req = self.request(Method::GET, &format!("books/{}/analysis", book_id), token)?;
        self.send(req, "Could not load analysis.").await
    }

    async fn fetch_recommendations(&self, token: &AccessToken) -> ApiResult<Recommendations> {
        let req = self.request(Method::GET, "recommendations", Some(token))?;
        self.send(req, "Could not load recommendations.").await
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}
