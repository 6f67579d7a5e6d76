use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderKind;
use super::user::{Profile, Repo};

/// Per-day contribution counts, iterated in chronological order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ContributionCalendar {
    days: BTreeMap<NaiveDate, u32>,
}

impl ContributionCalendar {
    /// Length of the trailing window kept for a calendar (53 weeks).
    pub const WINDOW_DAYS: i64 = 371;

    /// Builds a calendar from raw per-day counts. Repeated dates are summed.
    pub fn from_days(days: impl IntoIterator<Item = (NaiveDate, u32)>) -> Self {
        let mut calendar = Self::default();
        for (date, count) in days {
            *calendar.days.entry(date).or_insert(0) += count;
        }
        calendar
    }

    /// Dense calendar covering the `WINDOW_DAYS` days ending at `end`.
    /// Days absent from `days` count as zero; days outside the window are dropped.
    pub fn trailing_window(days: impl IntoIterator<Item = (NaiveDate, u32)>, end: NaiveDate) -> Self {
        let start = end - Duration::days(Self::WINDOW_DAYS - 1);
        let sparse = Self::from_days(days);

        let mut calendar = Self::default();
        let mut date = start;
        while date <= end {
            calendar
                .days
                .insert(date, sparse.days.get(&date).copied().unwrap_or(0));
            date += Duration::days(1);
        }
        calendar
    }

    pub fn days(&self) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
        self.days.iter().map(|(date, count)| (*date, *count))
    }

    pub fn get(&self, date: NaiveDate) -> Option<u32> {
        self.days.get(&date).copied()
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SearchKind {
    PullRequest,
    Issue,
}

/// The fixed set of pull request / issue searches run for every user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchCategory {
    PrAwaitingReview,
    PrOpenAuthored,
    PrMentions,
    IssueAssigned,
    IssueOpenAuthored,
    IssueMentions,
}

impl SearchCategory {
    pub const ALL: [SearchCategory; 6] = [
        SearchCategory::PrAwaitingReview,
        SearchCategory::PrOpenAuthored,
        SearchCategory::PrMentions,
        SearchCategory::IssueAssigned,
        SearchCategory::IssueOpenAuthored,
        SearchCategory::IssueMentions,
    ];

    pub fn kind(&self) -> SearchKind {
        match self {
            SearchCategory::PrAwaitingReview
            | SearchCategory::PrOpenAuthored
            | SearchCategory::PrMentions => SearchKind::PullRequest,
            SearchCategory::IssueAssigned
            | SearchCategory::IssueOpenAuthored
            | SearchCategory::IssueMentions => SearchKind::Issue,
        }
    }

    /// Key under which the result is stored in `UserStats::pull_requests` or `UserStats::issues`.
    pub fn key(&self) -> &'static str {
        match self {
            SearchCategory::PrAwaitingReview => "awaiting_review",
            SearchCategory::PrOpenAuthored | SearchCategory::IssueOpenAuthored => "open_authored",
            SearchCategory::PrMentions | SearchCategory::IssueMentions => "mentions",
            SearchCategory::IssueAssigned => "assigned",
        }
    }
}

impl std::fmt::Display for SearchCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchCategory::PrAwaitingReview => write!(f, "PRs awaiting review"),
            SearchCategory::PrOpenAuthored => write!(f, "open PRs"),
            SearchCategory::PrMentions => write!(f, "PR mentions"),
            SearchCategory::IssueAssigned => write!(f, "assigned issues"),
            SearchCategory::IssueOpenAuthored => write!(f, "open issues"),
            SearchCategory::IssueMentions => write!(f, "issue mentions"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchItem {
    pub title: String,
    pub repo: String,
    pub url: String,
    pub number: Option<u64>,
}

/// Result of one search category.
///
/// `is_exact` is true only when `count` came from a totals-capable API. A
/// source that caps its results reports `count == items.len()` with
/// `is_exact == false`, so a consumer can say "showing 5" instead of "5".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub count: u64,
    pub is_exact: bool,
    pub items: Vec<SearchItem>,
    /// The provider has no way to answer this category at all.
    #[serde(default)]
    pub unsupported: bool,
}

impl SearchResult {
    pub fn exact(total: u64, items: Vec<SearchItem>) -> Self {
        Self {
            count: total.max(items.len() as u64),
            is_exact: true,
            items,
            unsupported: false,
        }
    }

    pub fn capped(items: Vec<SearchItem>) -> Self {
        Self {
            count: items.len() as u64,
            is_exact: false,
            items,
            unsupported: false,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            count: 0,
            is_exact: false,
            items: Vec::new(),
            unsupported: true,
        }
    }
}

/// The canonical output of a fetch. Derived values are computed once by the
/// aggregator and never recomputed downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    pub username: String,
    pub provider: ProviderKind,
    pub profile: Profile,
    pub repositories: Vec<Repo>,
    /// `None` when the provider exposes no contribution calendar.
    pub contribution_calendar: Option<ContributionCalendar>,
    pub total_contributions: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// `None` when the provider has no star or fork counts.
    pub total_stars: Option<u64>,
    pub total_forks: Option<u64>,
    pub language_shares: BTreeMap<String, f64>,
    pub pull_requests: BTreeMap<String, SearchResult>,
    pub issues: BTreeMap<String, SearchResult>,
    pub fetched_at: DateTime<Utc>,
}

impl UserStats {
    /// Languages ordered by descending share, ties broken by name.
    pub fn top_languages(&self, limit: usize) -> Vec<(&str, f64)> {
        let mut languages: Vec<_> = self
            .language_shares
            .iter()
            .map(|(name, share)| (name.as_str(), *share))
            .collect();
        languages.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        languages.truncate(limit);
        languages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_trailing_window_is_dense() {
        let end = date("2024-06-30");
        let calendar = ContributionCalendar::trailing_window(
            vec![(date("2024-06-30"), 4), (date("2024-06-28"), 1), (date("2020-01-01"), 9)],
            end,
        );

        assert_eq!(calendar.len(), ContributionCalendar::WINDOW_DAYS as usize);
        assert_eq!(calendar.last_day(), Some(end));
        assert_eq!(calendar.first_day(), Some(end - Duration::days(370)));
        assert_eq!(calendar.get(date("2024-06-29")), Some(0));
        assert_eq!(calendar.get(date("2024-06-28")), Some(1));
        assert_eq!(calendar.get(date("2020-01-01")), None);
    }

    #[test]
    fn test_from_days_sums_duplicates_in_order() {
        let calendar = ContributionCalendar::from_days(vec![
            (date("2024-01-02"), 1),
            (date("2024-01-01"), 2),
            (date("2024-01-02"), 3),
        ]);
        let days: Vec<_> = calendar.days().collect();
        assert_eq!(days, vec![(date("2024-01-01"), 2), (date("2024-01-02"), 4)]);
    }

    #[test]
    fn test_calendar_serializes_as_date_map() {
        let calendar = ContributionCalendar::from_days(vec![(date("2024-01-01"), 2)]);
        let json = serde_json::to_string(&calendar).unwrap();
        assert_eq!(json, r#"{"2024-01-01":2}"#);
        let back: ContributionCalendar = serde_json::from_str(&json).unwrap();
        assert_eq!(back, calendar);
    }

    #[test]
    fn test_search_result_constructors() {
        let item = SearchItem {
            title: "Fix".into(),
            repo: "a/b".into(),
            url: "https://example.com/a/b/1".into(),
            number: Some(1),
        };

        let exact = SearchResult::exact(23, vec![item.clone()]);
        assert!(exact.is_exact);
        assert_eq!(exact.count, 23);

        let capped = SearchResult::capped(vec![item]);
        assert!(!capped.is_exact);
        assert_eq!(capped.count, 1);

        let unsupported = SearchResult::unsupported();
        assert!(unsupported.unsupported);
        assert!(!unsupported.is_exact);
    }

    #[test]
    fn test_category_keys_split_by_kind() {
        assert_eq!(SearchCategory::PrAwaitingReview.kind(), SearchKind::PullRequest);
        assert_eq!(SearchCategory::IssueAssigned.kind(), SearchKind::Issue);
        assert_eq!(SearchCategory::PrMentions.key(), SearchCategory::IssueMentions.key());
    }
}
