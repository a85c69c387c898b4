pub mod error;
pub mod http;
pub mod memory;
pub mod provider;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{ApiError, ApiResult, error_message};
pub use http::HttpLibraryApi;
pub use memory::InMemoryLibrary;
pub use provider::LibraryApi;
pub use types::*;
