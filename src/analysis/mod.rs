pub mod calendar;
pub mod languages;
pub mod aggregator;
pub mod pipeline;

pub use calendar::{compute_streaks, contribution_level, total_contributions, Streaks};
pub use languages::language_shares;
pub use aggregator::{RawStats, StatsAggregator};
pub use pipeline::{FetchOutcome, StatsOrigin, StatsPipeline};
