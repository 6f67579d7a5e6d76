pub mod sqlite;

pub use sqlite::{CacheStats, CacheStore, CachedAccount};
