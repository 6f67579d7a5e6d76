use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::analysis::calendar::{compute_streaks, total_contributions, Streaks};
use crate::analysis::languages::language_shares;
use crate::models::{
    ContributionCalendar, Profile, ProviderKind, Repo, SearchCategory, SearchKind, SearchResult,
    UserStats,
};

/// Raw, already-normalized provider payloads for one user.
#[derive(Debug, Clone)]
pub struct RawStats {
    pub profile: Profile,
    pub repositories: Vec<Repo>,
    /// `None` when the provider has no calendar.
    pub calendar: Option<ContributionCalendar>,
    pub searches: Vec<(SearchCategory, SearchResult)>,
}

/// Builds `UserStats` from raw payloads. Every derived value is computed here
/// and nowhere else.
#[derive(Debug, Default)]
pub struct StatsAggregator;

impl StatsAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(
        &self,
        username: &str,
        provider: ProviderKind,
        raw: RawStats,
        fetched_at: DateTime<Utc>,
    ) -> UserStats {
        let RawStats {
            profile,
            repositories,
            calendar,
            searches,
        } = raw;

        let (total, streaks) = match &calendar {
            Some(calendar) => (total_contributions(calendar), compute_streaks(calendar)),
            None => (0, Streaks::default()),
        };

        let mut pull_requests = BTreeMap::new();
        let mut issues = BTreeMap::new();
        for (category, result) in searches {
            let target = match category.kind() {
                SearchKind::PullRequest => &mut pull_requests,
                SearchKind::Issue => &mut issues,
            };
            target.insert(category.key().to_string(), result);
        }

        UserStats {
            username: username.to_string(),
            provider,
            language_shares: language_shares(&repositories),
            total_stars: popularity_total(provider, repositories.iter().map(|r| r.stars)),
            total_forks: popularity_total(provider, repositories.iter().map(|r| r.forks)),
            profile,
            repositories,
            contribution_calendar: calendar,
            total_contributions: total,
            current_streak: streaks.current,
            longest_streak: streaks.longest,
            pull_requests,
            issues,
            fetched_at,
        }
    }
}

fn popularity_total(provider: ProviderKind, counts: impl Iterator<Item = Option<u64>>) -> Option<u64> {
    provider
        .reports_popularity()
        .then(|| counts.flatten().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn repo(name: &str, stars: u64, forks: u64, language: &str) -> Repo {
        Repo {
            name: name.to_string(),
            stars: Some(stars),
            forks: Some(forks),
            primary_language: Some(language.to_string()),
            is_fork: false,
            pushed_at: None,
        }
    }

    fn raw(calendar: Option<ContributionCalendar>) -> RawStats {
        RawStats {
            profile: Profile {
                login: "octocat".to_string(),
                ..Default::default()
            },
            repositories: vec![repo("a", 10, 2, "Rust"), repo("b", 5, 1, "Go")],
            calendar,
            searches: vec![
                (SearchCategory::PrAwaitingReview, SearchResult::exact(23, Vec::new())),
                (SearchCategory::PrMentions, SearchResult::unsupported()),
                (SearchCategory::IssueAssigned, SearchResult::capped(Vec::new())),
            ],
        }
    }

    #[test]
    fn test_aggregate_derives_everything_once() {
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let calendar = ContributionCalendar::trailing_window(
            vec![(end, 3), (end.pred_opt().unwrap(), 2)],
            end,
        );
        let stats = StatsAggregator::new().aggregate(
            "octocat",
            ProviderKind::GitHub,
            raw(Some(calendar)),
            Utc::now(),
        );

        assert_eq!(stats.total_contributions, 5);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.longest_streak, 2);
        assert_eq!(stats.total_stars, Some(15));
        assert_eq!(stats.total_forks, Some(3));
        assert_eq!(stats.language_shares.len(), 2);
    }

    #[test]
    fn test_searches_split_by_kind_and_keep_exactness() {
        let stats =
            StatsAggregator::new().aggregate("octocat", ProviderKind::GitHub, raw(None), Utc::now());

        let awaiting = &stats.pull_requests["awaiting_review"];
        assert!(awaiting.is_exact);
        assert_eq!(awaiting.count, 23);
        assert!(stats.pull_requests["mentions"].unsupported);
        assert!(!stats.issues["assigned"].is_exact);
        assert!(!stats.issues.contains_key("awaiting_review"));
    }

    #[test]
    fn test_missing_calendar_is_not_zero_activity() {
        let stats =
            StatsAggregator::new().aggregate("someone", ProviderKind::Sourcehut, raw(None), Utc::now());
        assert!(stats.contribution_calendar.is_none());
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.total_contributions, 0);
    }

    #[test]
    fn test_popularity_unavailable_is_not_zero() {
        let mut input = raw(None);
        input.repositories = vec![Repo {
            name: "scdoc".to_string(),
            stars: None,
            forks: None,
            primary_language: None,
            is_fork: false,
            pushed_at: None,
        }];
        let stats =
            StatsAggregator::new().aggregate("sircmpwn", ProviderKind::Sourcehut, input, Utc::now());
        assert_eq!(stats.total_stars, None);
        assert_eq!(stats.total_forks, None);

        let mut input = raw(None);
        input.repositories.clear();
        let stats =
            StatsAggregator::new().aggregate("octocat", ProviderKind::GitHub, input, Utc::now());
        assert_eq!(stats.total_stars, Some(0));
    }
}
