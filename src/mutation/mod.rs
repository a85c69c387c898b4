pub mod executor;
pub mod types;

#[cfg(test)]
mod tests;

pub use executor::*;
pub use types::*;
