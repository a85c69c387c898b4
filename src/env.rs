//! Environment constants and path utilities for the shelf client.
//!
//! This module centralizes the hardcoded paths, storage keys and remote
//! defaults used throughout the crate, making them easier to maintain.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const SHELF_DIR_NAME: &str = ".shelf";

/// Configuration file name inside the shelf directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up directly in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "shelf.toml";

/// Environment variable overriding the configured API base URL
pub const API_URL_ENV: &str = "SHELF_API_URL";

/// Remote API defaults
pub mod api {
    /// Base URL of the library service
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

    /// Path prefix every endpoint lives under
    pub const API_PREFIX: &str = "api/v1";

    /// Per-request timeout in seconds
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default number of books per page
    pub const DEFAULT_PAGE_SIZE: u32 = 20;

    /// Largest page size the service accepts
    pub const MAX_PAGE_SIZE: u32 = 100;
}

/// Durable token storage names
pub mod storage {
    /// Token file name within .shelf
    pub const TOKEN_FILE_NAME: &str = "tokens.json";
}

/// Review input bounds mirrored from the service's form checks
pub mod review {
    pub const MIN_RATING: u8 = 1;
    pub const MAX_RATING: u8 = 5;
    pub const MIN_BODY_CHARS: usize = 10;
}

/// Build the .shelf directory path from a root
pub fn shelf_dir_path(root: &Path) -> PathBuf {
    root.join(SHELF_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    shelf_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file paths in the current directory, in priority order
pub fn local_config_file_paths(current_dir: &Path) -> [PathBuf; 2] {
    [
        current_dir.join(LOCAL_CONFIG_FILE_NAME),
        shelf_dir_path(current_dir).join(CONFIG_FILE_NAME),
    ]
}

/// Build the token file path in user's home directory
pub fn user_token_file_path(home_dir: &Path) -> PathBuf {
    shelf_dir_path(home_dir).join(storage::TOKEN_FILE_NAME)
}

/// Home directory from the environment
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_construction() {
        let home = Path::new("/home/reader");

        assert_eq!(shelf_dir_path(home), Path::new("/home/reader/.shelf"));
        assert_eq!(
            user_config_file_path(home),
            Path::new("/home/reader/.shelf/config.toml")
        );
        assert_eq!(
            user_token_file_path(home),
            Path::new("/home/reader/.shelf/tokens.json")
        );
    }

    #[test]
    fn test_local_config_priority() {
        let current = Path::new("/work/project");
        let [first, second] = local_config_file_paths(current);

        assert_eq!(first, Path::new("/work/project/shelf.toml"));
        assert_eq!(second, Path::new("/work/project/.shelf/config.toml"));
    }
}
