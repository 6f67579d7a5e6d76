use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;

use crate::analysis::aggregator::{RawStats, StatsAggregator};
use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::models::{
    ContributionCalendar, FetchOperation, ProviderKind, SearchCategory, SearchResult, UserStats,
};
use crate::providers::GitProvider;
use crate::storage::CacheStore;

/// Where the returned stats came from.
#[derive(Debug)]
pub enum StatsOrigin {
    Live,
    Cached,
    /// Live fetch failed; the most recent cache entry was served instead.
    Stale { error: Error },
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub stats: UserStats,
    pub origin: StatsOrigin,
}

impl FetchOutcome {
    pub fn is_stale(&self) -> bool {
        matches!(self.origin, StatsOrigin::Stale { .. })
    }

    /// The error that forced a stale fallback.
    pub fn stale_error(&self) -> Option<&Error> {
        match &self.origin {
            StatsOrigin::Stale { error } => Some(error),
            _ => None,
        }
    }
}

/// Fetch orchestrator: cache check, concurrent fetch, aggregation, cache write
/// and stale fallback.
pub struct StatsPipeline {
    provider: Arc<dyn GitProvider>,
    cache: CacheStore,
    aggregator: StatsAggregator,
    config: FetchConfig,
}

impl StatsPipeline {
    pub fn new(provider: Arc<dyn GitProvider>, cache: CacheStore, config: FetchConfig) -> Self {
        Self {
            provider,
            cache,
            aggregator: StatsAggregator::new(),
            config,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub async fn fetch(&self, username: &str) -> Result<FetchOutcome> {
        let kind = self.provider.kind();

        if !self.config.cache_bypass {
            if let Some(stats) = self.cached(username, false).await {
                tracing::info!("Serving cached stats for {} on {}", username, kind);
                return Ok(FetchOutcome {
                    stats,
                    origin: StatsOrigin::Cached,
                });
            }
        }

        match self.fetch_live(username).await {
            Ok(stats) => {
                self.store(username, &stats).await;
                Ok(FetchOutcome {
                    stats,
                    origin: StatsOrigin::Live,
                })
            }
            Err(error) => match self.cached(username, true).await {
                Some(stats) => {
                    tracing::warn!("Live fetch failed, serving stale cache: {}", error);
                    Ok(FetchOutcome {
                        stats,
                        origin: StatsOrigin::Stale { error },
                    })
                }
                None => Err(error),
            },
        }
    }

    async fn fetch_live(&self, username: &str) -> Result<UserStats> {
        tracing::info!("Fetching {} stats for {}", self.provider.kind(), username);

        let (profile, repositories, calendar, searches) = tokio::join!(
            self.provider.get_profile(username),
            self.provider.get_repositories(username),
            self.fetch_calendar(username),
            self.fetch_searches(username),
        );

        // Only the first failure is returned; report the rest here
        let failures = [
            (FetchOperation::Profile, profile.as_ref().err()),
            (FetchOperation::Repositories, repositories.as_ref().err()),
            (FetchOperation::ContributionCalendar, calendar.as_ref().err()),
            (FetchOperation::Search, searches.as_ref().err()),
        ]
        .into_iter()
        .filter_map(|(operation, error)| error.map(|e| (operation, e)));
        for (operation, error) in failures.skip(1) {
            tracing::warn!("Fetching {} also failed: {}", operation, error);
        }

        let raw = RawStats {
            profile: profile.map_err(|e| Error::fetch_failed(FetchOperation::Profile, e))?,
            repositories: repositories
                .map_err(|e| Error::fetch_failed(FetchOperation::Repositories, e))?,
            calendar: calendar
                .map_err(|e| Error::fetch_failed(FetchOperation::ContributionCalendar, e))?,
            searches: searches.map_err(|e| Error::fetch_failed(FetchOperation::Search, e))?,
        };

        Ok(self
            .aggregator
            .aggregate(username, self.provider.kind(), raw, Utc::now()))
    }

    async fn fetch_calendar(&self, username: &str) -> Result<Option<ContributionCalendar>> {
        match self.provider.get_contribution_calendar(username).await {
            Ok(calendar) => Ok(Some(calendar)),
            Err(Error::ProviderUnsupported { capability, .. }) => {
                tracing::debug!("{} has no {}", self.provider.kind(), capability);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_searches(&self, username: &str) -> Result<Vec<(SearchCategory, SearchResult)>> {
        let searches = SearchCategory::ALL.iter().map(|&category| async move {
            let result = match self.provider.search_items(username, category).await {
                Ok(result) => result,
                Err(Error::ProviderUnsupported { capability, .. }) => {
                    tracing::debug!("{} does not support {}", self.provider.kind(), capability);
                    SearchResult::unsupported()
                }
                Err(e) => return Err(e),
            };
            Ok((category, result))
        });

        join_all(searches).await.into_iter().collect()
    }

    async fn cached(&self, username: &str, allow_stale: bool) -> Option<UserStats> {
        let cache = self.cache.clone();
        let kind = self.provider.kind();
        let username = username.to_string();

        tokio::task::spawn_blocking(move || {
            if allow_stale {
                cache.get_stale(kind, &username)
            } else {
                cache.get(kind, &username)
            }
        })
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Cache read task failed: {}", e);
            None
        })
    }

    async fn store(&self, username: &str, stats: &UserStats) {
        let cache = self.cache.clone();
        let kind = self.provider.kind();
        let username = username.to_string();
        let stats = stats.clone();
        let ttl = self.config.cache_ttl_minutes;

        if let Err(e) =
            tokio::task::spawn_blocking(move || cache.put(kind, &username, &stats, ttl)).await
        {
            tracing::warn!("Cache write task failed: {}", e);
        }
    }
}
