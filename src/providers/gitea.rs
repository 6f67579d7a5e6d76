use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    ContributionCalendar, Profile, ProviderKind, Repo, SearchCategory, SearchItem, SearchResult,
    SecretToken,
};
use crate::providers::http::{header_str, HttpTransport};
use crate::providers::paginator::{fetch_all_pages, link_has_next, Page};
use crate::providers::provider::GitProvider;
use crate::providers::retry::RetryPolicy;
use crate::providers::{unsupported, user_lookup_error, SEARCH_SAMPLE_SIZE};

/// Gitea caps `limit` at 50 by default.
const GITEA_PAGE_SIZE: usize = 50;

/// Gitea and Forgejo instances (including Codeberg) over the v1 REST API.
pub struct GiteaClient {
    http: HttpTransport,
    api_base: String,
    auth_login: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct GiteaUser {
    login: String,
    full_name: Option<String>,
    avatar_url: Option<String>,
    description: Option<String>,
    location: Option<String>,
    followers_count: Option<u64>,
    following_count: Option<u64>,
    created: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GiteaRepo {
    name: String,
    stars_count: u64,
    forks_count: u64,
    language: Option<String>,
    fork: bool,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct HeatmapEntry {
    timestamp: i64,
    contributions: u32,
}

#[derive(Debug, Deserialize)]
struct GiteaIssue {
    number: u64,
    title: String,
    html_url: String,
    repository: Option<GiteaIssueRepo>,
}

#[derive(Debug, Deserialize)]
struct GiteaIssueRepo {
    full_name: String,
}

impl GiteaClient {
    pub fn new(
        base_url: &str,
        token: Option<SecretToken>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        if base_url.is_empty() {
            return Err(Error::Config("Gitea requires an instance URL".to_string()));
        }

        Ok(Self {
            http: HttpTransport::new(ProviderKind::Gitea, token, timeout, policy)?,
            api_base: format!("{}/api/v1", base_url),
            auth_login: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn login(&self) -> Result<&str> {
        self.auth_login
            .get_or_try_init(|| async {
                let user: GiteaUser = self.http.get_json(&self.url("/user")).await?.body;
                Ok::<_, Error>(user.login)
            })
            .await
            .map(String::as_str)
    }
}

#[async_trait]
impl GitProvider for GiteaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gitea
    }

    async fn authenticated_user(&self) -> Result<String> {
        self.login().await.map(str::to_string)
    }

    async fn get_profile(&self, username: &str) -> Result<Profile> {
        tracing::info!("Fetching Gitea profile: {}", username);
        let user: GiteaUser = self
            .http
            .get_json(&self.url(&format!("/users/{}", username)))
            .await
            .map_err(|e| user_lookup_error(e, username, ProviderKind::Gitea))?
            .body;
        Ok(normalize_profile(user))
    }

    async fn get_repositories(&self, username: &str) -> Result<Vec<Repo>> {
        tracing::info!("Fetching Gitea repositories for: {}", username);
        let repos: Vec<GiteaRepo> = fetch_all_pages(GITEA_PAGE_SIZE, |page| async move {
            let url = self.url(&format!(
                "/users/{}/repos?page={}&limit={}",
                username, page, GITEA_PAGE_SIZE
            ));
            let response = self.http.get_json::<Vec<GiteaRepo>>(&url).await?;
            let link = header_str(&response.headers, "link");
            Ok(match link {
                Some(_) => Page::with_next(response.body, link_has_next(link)),
                None => Page::new(response.body),
            })
        })
        .await
        .map_err(|e| user_lookup_error(e, username, ProviderKind::Gitea))?;

        Ok(repos.into_iter().map(normalize_repo).collect())
    }

    async fn get_contribution_calendar(&self, username: &str) -> Result<ContributionCalendar> {
        tracing::info!("Fetching Gitea heatmap for: {}", username);
        let entries: Vec<HeatmapEntry> = self
            .http
            .get_json(&self.url(&format!("/users/{}/heatmap", username)))
            .await
            .map_err(|e| user_lookup_error(e, username, ProviderKind::Gitea))?
            .body;

        Ok(calendar_from_heatmap(&entries, Utc::now().date_naive()))
    }

    async fn search_items(&self, username: &str, category: SearchCategory) -> Result<SearchResult> {
        // The issue search filters only ever apply to the token's own account
        let login = self.login().await?;
        if !login.eq_ignore_ascii_case(username) {
            return Err(unsupported(
                ProviderKind::Gitea,
                format!("searching {} for users other than {}", category, login),
            ));
        }

        let url = self.url(&search_path(category));
        tracing::debug!("Searching Gitea: {}", url);
        let response = self.http.get_json::<Vec<GiteaIssue>>(&url).await?;
        Ok(search_result_from(&response.headers, response.body))
    }
}

/// Exact when the server reports `X-Total-Count`, capped otherwise.
fn search_result_from(headers: &HeaderMap, issues: Vec<GiteaIssue>) -> SearchResult {
    let items: Vec<SearchItem> = issues
        .into_iter()
        .take(SEARCH_SAMPLE_SIZE)
        .map(normalize_issue)
        .collect();

    match header_str(headers, "x-total-count").and_then(|v| v.trim().parse().ok()) {
        Some(total) => SearchResult::exact(total, items),
        None => SearchResult::capped(items),
    }
}

fn search_path(category: SearchCategory) -> String {
    let (kind, filter) = match category {
        SearchCategory::PrAwaitingReview => ("pulls", "review_requested"),
        SearchCategory::PrOpenAuthored => ("pulls", "created"),
        SearchCategory::PrMentions => ("pulls", "mentioned"),
        SearchCategory::IssueAssigned => ("issues", "assigned"),
        SearchCategory::IssueOpenAuthored => ("issues", "created"),
        SearchCategory::IssueMentions => ("issues", "mentioned"),
    };
    format!(
        "/repos/issues/search?type={}&state=open&{}=true&limit={}&page=1",
        kind, filter, SEARCH_SAMPLE_SIZE
    )
}

fn normalize_profile(user: GiteaUser) -> Profile {
    Profile {
        login: user.login,
        display_name: user.full_name.filter(|n| !n.is_empty()),
        avatar_url: user.avatar_url.filter(|a| !a.is_empty()),
        bio: user.description.filter(|b| !b.is_empty()),
        location: user.location.filter(|l| !l.is_empty()),
        followers: user.followers_count,
        following: user.following_count,
        joined_at: user.created,
    }
}

fn normalize_repo(repo: GiteaRepo) -> Repo {
    Repo {
        name: repo.name,
        stars: Some(repo.stars_count),
        forks: Some(repo.forks_count),
        primary_language: repo.language.filter(|l| !l.is_empty()),
        is_fork: repo.fork,
        pushed_at: repo.updated_at,
    }
}

fn normalize_issue(issue: GiteaIssue) -> SearchItem {
    SearchItem {
        title: issue.title,
        repo: issue.repository.map(|r| r.full_name).unwrap_or_default(),
        url: issue.html_url,
        number: Some(issue.number),
    }
}

/// Heatmap entries are bucketed in 15-minute slots; they are summed per UTC day.
fn calendar_from_heatmap(entries: &[HeatmapEntry], today: NaiveDate) -> ContributionCalendar {
    ContributionCalendar::trailing_window(
        entries.iter().filter_map(|entry| {
            Utc.timestamp_opt(entry.timestamp, 0)
                .single()
                .map(|at| (at.date_naive(), entry.contributions))
        }),
        today,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heatmap_sums_slots_per_day() {
        let entries: Vec<HeatmapEntry> = serde_json::from_str(
            r#"[
                {"timestamp": 1719705600, "contributions": 2},
                {"timestamp": 1719706500, "contributions": 3},
                {"timestamp": 1719619200, "contributions": 1}
            ]"#,
        )
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let calendar = calendar_from_heatmap(&entries, today);

        assert_eq!(calendar.get(today), Some(5));
        assert_eq!(calendar.get(NaiveDate::from_ymd_opt(2024, 6, 29).unwrap()), Some(1));
        assert_eq!(calendar.get(NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()), Some(0));
        assert_eq!(calendar.last_day(), Some(today));
    }

    #[test]
    fn test_normalize_profile_and_repo() {
        let user: GiteaUser = serde_json::from_str(
            r#"{"id": 3, "login": "alice", "full_name": "", "avatar_url": "https://codeberg.org/avatars/a",
                "description": "hacker", "location": "", "followers_count": 7, "following_count": 2,
                "created": "2020-02-01T12:00:00Z"}"#,
        )
        .unwrap();
        let profile = normalize_profile(user);
        assert_eq!(profile.login, "alice");
        assert_eq!(profile.display_name, None);
        assert_eq!(profile.bio.as_deref(), Some("hacker"));
        assert_eq!(profile.followers, Some(7));

        let repo: GiteaRepo = serde_json::from_str(
            r#"{"name": "site", "stars_count": 3, "forks_count": 0, "language": "",
                "fork": true, "updated_at": "2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let repo = normalize_repo(repo);
        assert!(repo.is_fork);
        assert_eq!(repo.primary_language, None);
    }

    #[test]
    fn test_search_paths() {
        assert_eq!(
            search_path(SearchCategory::PrAwaitingReview),
            "/repos/issues/search?type=pulls&state=open&review_requested=true&limit=5&page=1"
        );
        assert_eq!(
            search_path(SearchCategory::IssueMentions),
            "/repos/issues/search?type=issues&state=open&mentioned=true&limit=5&page=1"
        );
    }

    #[test]
    fn test_issue_repository_name() {
        let issue: GiteaIssue = serde_json::from_str(
            r#"{"number": 4, "title": "Crash on start", "html_url": "https://codeberg.org/a/b/issues/4",
                "repository": {"id": 1, "name": "b", "owner": "a", "full_name": "a/b"}}"#,
        )
        .unwrap();
        let item = normalize_issue(issue);
        assert_eq!(item.repo, "a/b");
        assert_eq!(item.number, Some(4));
    }

    fn issues(count: u64) -> Vec<GiteaIssue> {
        (1..=count)
            .map(|number| GiteaIssue {
                number,
                title: format!("Issue {}", number),
                html_url: format!("https://codeberg.org/a/b/issues/{}", number),
                repository: Some(GiteaIssueRepo {
                    full_name: "a/b".to_string(),
                }),
            })
            .collect()
    }

    #[test]
    fn test_total_count_header_makes_search_exact() {
        let mut headers = HeaderMap::new();
        headers.insert("x-total-count", "42".parse().unwrap());

        let result = search_result_from(&headers, issues(5));
        assert!(result.is_exact);
        assert_eq!(result.count, 42);
        assert_eq!(result.items.len(), 5);
        assert!(result.count > result.items.len() as u64);
    }

    #[test]
    fn test_missing_total_count_is_capped() {
        let result = search_result_from(&HeaderMap::new(), issues(3));
        assert!(!result.is_exact);
        assert_eq!(result.count, 3);

        let mut headers = HeaderMap::new();
        headers.insert("x-total-count", "lots".parse().unwrap());
        assert!(!search_result_from(&headers, issues(2)).is_exact);
    }

    #[test]
    fn test_empty_url_is_config_error() {
        let result = GiteaClient::new("", None, Duration::from_secs(10), RetryPolicy::immediate(1));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
