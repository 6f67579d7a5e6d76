use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    ContributionCalendar, Profile, ProviderKind, Repo, SearchCategory, SearchItem, SearchResult,
};
use crate::providers::cli::CliRunner;
use crate::providers::paginator::{fetch_all_pages, fetch_pages_up_to, Page};
use crate::providers::provider::GitProvider;
use crate::providers::retry::RetryPolicy;
use crate::providers::{unsupported, user_lookup_error, REPOS_PER_PAGE, SEARCH_SAMPLE_SIZE};

/// Concurrent per-project language lookups.
const LANGUAGE_CONCURRENCY: usize = 4;

/// A year of events for a very active account runs well past the default
/// page cap.
const EVENT_MAX_PAGES: u32 = 2_000;

/// GitLab through the `glab` CLI. GitLab's list endpoints cap results without
/// totals in the body, so every search category is reported as capped.
pub struct GitLabClient {
    cli: CliRunner,
}

#[derive(Debug, Deserialize)]
struct GlUserSummary {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GlUser {
    username: String,
    name: Option<String>,
    avatar_url: Option<String>,
    bio: Option<String>,
    location: Option<String>,
    followers: Option<u64>,
    following: Option<u64>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GlProject {
    id: u64,
    name: String,
    star_count: u64,
    forks_count: u64,
    #[serde(default)]
    forked_from_project: Option<serde_json::Value>,
    last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GlEvent {
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GlItem {
    iid: u64,
    title: String,
    web_url: String,
    references: Option<GlReferences>,
}

#[derive(Debug, Deserialize)]
struct GlReferences {
    full: String,
}

impl GitLabClient {
    /// `hostname` selects a self-managed instance; `None` is gitlab.com.
    pub fn new(hostname: Option<String>, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            cli: CliRunner::new(ProviderKind::GitLab, "glab", timeout, policy).with_hostname(hostname),
        }
    }

    async fn primary_language(&self, project_id: u64) -> Result<Option<String>> {
        let endpoint = format!("projects/{}/languages", project_id);
        match self.cli.run_json::<HashMap<String, f64>>(&["api", &endpoint]).await {
            Ok(languages) => Ok(dominant_language(&languages)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl GitProvider for GitLabClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    async fn authenticated_user(&self) -> Result<String> {
        let user: GlUser = self.cli.run_json(&["api", "user"]).await?;
        Ok(user.username)
    }

    async fn get_profile(&self, username: &str) -> Result<Profile> {
        tracing::info!("Fetching GitLab profile: {}", username);
        let endpoint = format!("users?username={}", username);
        let matches: Vec<GlUserSummary> = self.cli.run_json(&["api", &endpoint]).await?;
        let id = matches
            .first()
            .map(|u| u.id)
            .ok_or_else(|| Error::UserNotFound {
                username: username.to_string(),
                provider: ProviderKind::GitLab,
            })?;

        let endpoint = format!("users/{}", id);
        let user: GlUser = self
            .cli
            .run_json(&["api", &endpoint])
            .await
            .map_err(|e| user_lookup_error(e, username, ProviderKind::GitLab))?;
        Ok(normalize_profile(user))
    }

    async fn get_repositories(&self, username: &str) -> Result<Vec<Repo>> {
        tracing::info!("Fetching GitLab projects for: {}", username);
        let projects: Vec<GlProject> = fetch_all_pages(REPOS_PER_PAGE, |page| async move {
            let endpoint = format!(
                "users/{}/projects?order_by=last_activity_at&per_page={}&page={}",
                username, REPOS_PER_PAGE, page
            );
            let items: Vec<GlProject> = self.cli.run_json(&["api", &endpoint]).await?;
            Ok(Page::new(items))
        })
        .await
        .map_err(|e| user_lookup_error(e, username, ProviderKind::GitLab))?;

        // GitLab only reports languages per project
        stream::iter(projects)
            .map(|project| async move {
                let language = self.primary_language(project.id).await?;
                Ok::<_, Error>(normalize_repo(project, language))
            })
            .buffered(LANGUAGE_CONCURRENCY)
            .try_collect()
            .await
    }

    async fn get_contribution_calendar(&self, username: &str) -> Result<ContributionCalendar> {
        tracing::info!("Fetching GitLab events for: {}", username);
        let today = Utc::now().date_naive();
        let after = today - ChronoDuration::days(ContributionCalendar::WINDOW_DAYS);

        let after = after.format("%Y-%m-%d").to_string();
        let after = after.as_str();
        let events: Vec<GlEvent> =
            fetch_pages_up_to(REPOS_PER_PAGE, EVENT_MAX_PAGES, |page| async move {
                let endpoint = format!(
                    "users/{}/events?after={}&per_page={}&page={}",
                    username, after, REPOS_PER_PAGE, page
                );
                let items: Vec<GlEvent> = self.cli.run_json(&["api", &endpoint]).await?;
                Ok(Page::new(items))
            })
            .await
            .map_err(|e| user_lookup_error(e, username, ProviderKind::GitLab))?;

        Ok(calendar_from_events(&events, today))
    }

    async fn search_items(&self, username: &str, category: SearchCategory) -> Result<SearchResult> {
        let endpoint = search_endpoint(category, username)
            .ok_or_else(|| unsupported(ProviderKind::GitLab, format!("searching {}", category)))?;
        tracing::debug!("Searching GitLab: {}", endpoint);

        let stdout = self.cli.run(&["api", &endpoint]).await?;
        parse_search_items(&stdout)
    }
}

fn search_endpoint(category: SearchCategory, username: &str) -> Option<String> {
    let (resource, filter) = match category {
        SearchCategory::PrAwaitingReview => ("merge_requests", "reviewer_username"),
        SearchCategory::PrOpenAuthored => ("merge_requests", "author_username"),
        SearchCategory::IssueAssigned => ("issues", "assignee_username"),
        SearchCategory::IssueOpenAuthored => ("issues", "author_username"),
        SearchCategory::PrMentions | SearchCategory::IssueMentions => return None,
    };
    Some(format!(
        "{}?state=opened&scope=all&{}={}&per_page={}",
        resource, filter, username, SEARCH_SAMPLE_SIZE
    ))
}

/// GitLab list bodies carry no total, so the result is always capped.
fn parse_search_items(body: &str) -> Result<SearchResult> {
    let items: Vec<GlItem> = serde_json::from_str(body).map_err(|e| {
        Error::ResponseMalformed(format!("glab returned unexpected JSON: {}", e))
    })?;
    Ok(SearchResult::capped(
        items
            .into_iter()
            .take(SEARCH_SAMPLE_SIZE)
            .map(normalize_item)
            .collect(),
    ))
}

fn normalize_profile(user: GlUser) -> Profile {
    Profile {
        login: user.username,
        display_name: user.name.filter(|n| !n.is_empty()),
        avatar_url: user.avatar_url,
        bio: user.bio.filter(|b| !b.is_empty()),
        location: user.location.filter(|l| !l.is_empty()),
        followers: user.followers,
        following: user.following,
        joined_at: user.created_at,
    }
}

fn normalize_repo(project: GlProject, primary_language: Option<String>) -> Repo {
    Repo {
        name: project.name,
        stars: Some(project.star_count),
        forks: Some(project.forks_count),
        primary_language,
        is_fork: project.forked_from_project.is_some(),
        pushed_at: project.last_activity_at,
    }
}

fn normalize_item(item: GlItem) -> SearchItem {
    let repo = item
        .references
        .map(|r| {
            r.full
                .split(|c| c == '!' || c == '#')
                .next()
                .unwrap_or_default()
                .to_string()
        })
        .unwrap_or_default();

    SearchItem {
        title: item.title,
        repo,
        url: item.web_url,
        number: Some(item.iid),
    }
}

/// The language with the largest share; GitLab reports percentages per project.
fn dominant_language(languages: &HashMap<String, f64>) -> Option<String> {
    languages
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, _)| name.clone())
}

fn calendar_from_events(events: &[GlEvent], today: NaiveDate) -> ContributionCalendar {
    ContributionCalendar::trailing_window(
        events.iter().map(|event| (event.created_at.date_naive(), 1)),
        today,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_project_detects_forks() {
        let project: GlProject = serde_json::from_str(
            r#"{"id": 5, "name": "tool", "star_count": 4, "forks_count": 1,
                "forked_from_project": {"id": 2}, "last_activity_at": "2024-03-01T00:00:00Z"}"#,
        )
        .unwrap();
        let repo = normalize_repo(project, Some("Go".to_string()));
        assert!(repo.is_fork);
        assert_eq!(repo.stars, Some(4));
        assert_eq!(repo.primary_language.as_deref(), Some("Go"));

        let project: GlProject = serde_json::from_str(
            r#"{"id": 6, "name": "own", "star_count": 0, "forks_count": 0, "last_activity_at": null}"#,
        )
        .unwrap();
        assert!(!normalize_repo(project, None).is_fork);
    }

    #[test]
    fn test_dominant_language() {
        let mut languages = HashMap::new();
        languages.insert("Ruby".to_string(), 20.5);
        languages.insert("Go".to_string(), 70.0);
        languages.insert("Shell".to_string(), 9.5);
        assert_eq!(dominant_language(&languages).as_deref(), Some("Go"));
        assert_eq!(dominant_language(&HashMap::new()), None);
    }

    #[test]
    fn test_events_bucket_per_day() {
        let events: Vec<GlEvent> = serde_json::from_str(
            r#"[
                {"created_at": "2024-06-30T09:00:00Z", "action_name": "pushed to"},
                {"created_at": "2024-06-30T18:00:00Z", "action_name": "opened"},
                {"created_at": "2024-06-28T12:00:00Z", "action_name": "commented on"}
            ]"#,
        )
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let calendar = calendar_from_events(&events, today);

        assert_eq!(calendar.get(today), Some(2));
        assert_eq!(calendar.get(NaiveDate::from_ymd_opt(2024, 6, 29).unwrap()), Some(0));
        assert_eq!(calendar.get(NaiveDate::from_ymd_opt(2024, 6, 28).unwrap()), Some(1));
    }

    #[test]
    fn test_search_items_are_capped() {
        let result = parse_search_items(
            r#"[{"iid": 12, "title": "Fix pipeline", "web_url": "https://gitlab.com/g/p/-/merge_requests/12",
                 "references": {"full": "g/p!12"}},
                {"iid": 3, "title": "Crash on start", "web_url": "https://gitlab.com/g/q/-/issues/3",
                 "references": {"full": "g/q#3"}}]"#,
        )
        .unwrap();

        assert!(!result.is_exact);
        assert!(!result.unsupported);
        assert_eq!(result.count, 2);
        assert_eq!(result.items[0].repo, "g/p");
        assert_eq!(result.items[0].number, Some(12));
        assert_eq!(result.items[1].repo, "g/q");
    }

    #[test]
    fn test_search_items_keep_sample_size() {
        let body = serde_json::to_string(
            &(1..=8)
                .map(|iid| {
                    serde_json::json!({
                        "iid": iid,
                        "title": format!("MR {}", iid),
                        "web_url": "https://gitlab.com/g/p",
                        "references": {"full": format!("g/p!{}", iid)}
                    })
                })
                .collect::<Vec<_>>(),
        )
        .unwrap();
        let result = parse_search_items(&body).unwrap();

        assert!(!result.is_exact);
        assert_eq!(result.items.len(), SEARCH_SAMPLE_SIZE);
    }

    #[test]
    fn test_search_items_reject_non_list() {
        assert!(matches!(
            parse_search_items(r#"{"message": "oops"}"#),
            Err(Error::ResponseMalformed(_))
        ));
    }

    #[test]
    fn test_self_managed_host_reaches_cli() {
        let client = GitLabClient::new(
            Some("gitlab.example.com".to_string()),
            Duration::from_secs(10),
            RetryPolicy::immediate(1),
        );
        assert_eq!(client.cli.hostname(), Some("gitlab.example.com"));

        let client = GitLabClient::new(None, Duration::from_secs(10), RetryPolicy::immediate(1));
        assert_eq!(client.cli.hostname(), None);
    }

    #[test]
    fn test_mentions_have_no_endpoint() {
        assert!(search_endpoint(SearchCategory::PrMentions, "me").is_none());
        assert_eq!(
            search_endpoint(SearchCategory::PrAwaitingReview, "me").unwrap(),
            "merge_requests?state=opened&scope=all&reviewer_username=me&per_page=5"
        );
    }
}
