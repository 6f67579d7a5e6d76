pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod analysis;
pub mod storage;

pub use config::{Config, FetchConfig};
pub use error::{Error, Result};
pub use providers::{build_provider, GitProvider};
pub use analysis::{FetchOutcome, StatsAggregator, StatsOrigin, StatsPipeline};
pub use storage::CacheStore;
