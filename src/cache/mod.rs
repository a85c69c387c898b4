pub mod key;
pub mod query_cache;


pub use key::*;
pub use query_cache::*;
