//! CLI-specific functionality for the shelf client
//!
//! Argument parsing and command execution; configuration discovery lives in
//! [`crate::config`].

pub mod args;
pub mod commands;

pub use args::{Args, Commands};
pub use commands::execute;
