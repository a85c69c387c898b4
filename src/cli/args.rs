//! Command line argument parsing
//!
//! Every subcommand except `show-config` runs against the library service
//! after restoring the persisted session.

use crate::api::{BookId, BookUpdate, ProfileUpdate, SignupRequest, UploadFile};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "shelf")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Command line client for the library service")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path (skips discovery)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register a new account
    Signup {
        email: String,
        username: String,
        #[arg(short = 'p', long = "password")]
        password: String,
        #[arg(long = "full-name")]
        full_name: Option<String>,
    },
    /// Sign in and persist the session
    Login {
        email: String,
        #[arg(short = 'p', long = "password")]
        password: String,
    },
    /// Sign out and forget the persisted session
    Logout,
    /// Show the signed-in profile
    Whoami,
    /// Update the signed-in profile
    Profile {
        #[arg(long = "full-name")]
        full_name: Option<String>,
        #[arg(long = "bio")]
        bio: Option<String>,
        #[arg(long = "password")]
        password: Option<String>,
    },
    /// List one catalogue page
    Books {
        #[arg(long = "page", default_value_t = 1)]
        page: u32,
        #[arg(short = 'g', long = "genre")]
        genre: Option<String>,
    },
    /// List books you currently hold
    Borrowed,
    /// Borrow a book
    Borrow { book_id: BookId },
    /// Return a borrowed book
    Return { book_id: BookId },
    /// Review a book you hold
    Review {
        book_id: BookId,
        #[arg(short = 'r', long = "rating")]
        rating: u8,
        /// Review text
        body: String,
    },
    /// Show the summary and review consensus of a book
    Analysis { book_id: BookId },
    /// Show recommended books
    Recommend,
    /// Upload a new book (PDF or plain text)
    Upload {
        file: PathBuf,
        #[arg(long = "title")]
        title: String,
        #[arg(long = "author")]
        author: String,
        #[arg(long = "genre")]
        genre: Option<String>,
        #[arg(long = "description")]
        description: Option<String>,
        #[arg(long = "year")]
        year: Option<i32>,
    },
    /// Edit book metadata
    Edit {
        book_id: BookId,
        #[arg(long = "title")]
        title: Option<String>,
        #[arg(long = "author")]
        author: Option<String>,
        #[arg(long = "genre")]
        genre: Option<String>,
        #[arg(long = "description")]
        description: Option<String>,
        #[arg(long = "year")]
        year: Option<i32>,
    },
    /// Delete a book
    Delete { book_id: BookId },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }
}

impl Commands {
    /// Whether the command talks to the service at all
    pub fn needs_client(&self) -> bool {
        !matches!(self, Commands::ShowConfig)
    }

    pub fn signup_request(&self) -> Option<SignupRequest> {
        match self {
            Commands::Signup {
                email,
                username,
                password,
                full_name,
            } => Some(SignupRequest {
                email: email.clone(),
                username: username.clone(),
                password: password.clone(),
                full_name: full_name.clone(),
            }),
            _ => None,
        }
    }

    pub fn profile_update(&self) -> Option<ProfileUpdate> {
        match self {
            Commands::Profile {
                full_name,
                bio,
                password,
            } => Some(ProfileUpdate {
                full_name: full_name.clone(),
                bio: bio.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn book_update(&self) -> Option<BookUpdate> {
        match self {
            Commands::Edit {
                title,
                author,
                genre,
                description,
                year,
                ..
            } => Some(BookUpdate {
                title: title.clone(),
                author: author.clone(),
                description: description.clone(),
                genre: genre.clone(),
                published_year: *year,
            }),
            _ => None,
        }
    }
}

/// Upload content type from the file extension
///
/// Extension matching is case-insensitive; anything that is not a PDF is sent
/// as plain text and left for the service to judge.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "pdf" => "application/pdf",
        _ => "text/plain",
    }
}

/// Read an upload from disk
pub async fn read_upload(path: &Path) -> std::io::Result<UploadFile> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();

    Ok(UploadFile {
        file_name,
        content_type: content_type_for(path).to_string(),
        bytes,
    })
}
