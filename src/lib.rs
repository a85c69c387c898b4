//! # Shelf
//!
//! Client-side state synchronization for a library service: an authenticated
//! session, a tag-invalidated query cache, serialized mutations and the set
//! of books the signed-in user currently holds.
//!
//! ## Architecture Overview
//!
//! - **[`api`]**: The remote service capability, its HTTP and in-memory backends
//! - **[`session`]**: Session lifecycle, token persistence and forced logout
//! - **[`cache`]**: Keyed query cache with single-flight fetching
//! - **[`mutation`]**: Confirm-then-update server writes
//! - **[`borrow`]**: The membership set behind "is this mine" checks
//! - **[`client`]**: The facade rendering code talks to
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shelf::{LibraryClient, config::ConfigDiscovery};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (config, _) = ConfigDiscovery::discover()?;
//!     let client = LibraryClient::from_config(&config)?;
//!
//!     client.initialize().await;
//!     client.login("reader@example.com", "secret").await?;
//!
//!     let page = client.fetch_books(1, None).await?;
//!     if let Some(book) = page.items.first() {
//!         client.borrow(book.id).await?;
//!     }
//!     Ok(())
//! }
//! ```

/// Remote service types, errors and backends.
pub mod api;

/// Membership set of borrowed books.
pub mod borrow;

/// Query cache with tag invalidation.
pub mod cache;

pub mod client;

/// Configuration file discovery and loading.
pub mod config;

/// Environment constants and path utilities.
pub mod env;

pub mod error;

/// Server writes and their intents.
pub mod mutation;

/// Session management and token persistence.
pub mod session;

pub mod storage;

/// Command line interface.
pub mod cli;

pub use api::{ApiError, HttpLibraryApi, InMemoryLibrary, LibraryApi};
pub use client::{ClientOptions, LibraryClient};
pub use config::ShelfConfig;
pub use error::{SyncError, SyncResult};
pub use mutation::{Mutation, MutationEvent, MutationKind, MutationOutput};
pub use session::{SessionEvent, SessionManager, SessionSnapshot};
pub use storage::{FileTokenStore, MemoryTokenStore, TokenStore};
