use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    ContributionCalendar, Profile, ProviderKind, Repo, SearchCategory, SearchItem, SearchResult,
};
use crate::providers::cli::CliRunner;
use crate::providers::graphql::GraphQlResponse;
use crate::providers::paginator::{fetch_all_pages, Page};
use crate::providers::provider::GitProvider;
use crate::providers::retry::RetryPolicy;
use crate::providers::search_query::SearchQuery;
use crate::providers::{user_lookup_error, REPOS_PER_PAGE, SEARCH_SAMPLE_SIZE};

const CALENDAR_QUERY: &str = r#"query($login: String!) {
  user(login: $login) {
    contributionsCollection {
      contributionCalendar {
        weeks { contributionDays { contributionCount date } }
      }
    }
  }
}"#;

const SEARCH_QUERY: &str = r#"query($q: String!, $first: Int!) {
  search(query: $q, type: ISSUE, first: $first) {
    issueCount
    nodes {
      ... on PullRequest { number title url repository { nameWithOwner } }
      ... on Issue { number title url repository { nameWithOwner } }
    }
  }
}"#;

/// GitHub through the `gh` CLI. REST for profile and repositories, GraphQL for
/// the contribution calendar and for search, which reports exact totals.
pub struct GitHubClient {
    cli: CliRunner,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
    bio: Option<String>,
    location: Option<String>,
    followers: Option<u64>,
    following: Option<u64>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GhRepo {
    name: String,
    stargazers_count: u64,
    forks_count: u64,
    language: Option<String>,
    fork: bool,
    pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CalendarData {
    user: Option<CalendarUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarUser {
    contributions_collection: ContributionsCollection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContributionsCollection {
    contribution_calendar: CalendarWeeks,
}

#[derive(Debug, Deserialize)]
struct CalendarWeeks {
    weeks: Vec<Week>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Week {
    contribution_days: Vec<Day>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Day {
    contribution_count: u32,
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: SearchConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    issue_count: u64,
    nodes: Vec<SearchNode>,
}

#[derive(Debug, Deserialize)]
struct SearchNode {
    number: Option<u64>,
    title: Option<String>,
    url: Option<String>,
    repository: Option<NodeRepository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeRepository {
    name_with_owner: String,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    login: String,
}

impl GitHubClient {
    /// `hostname` selects a GitHub Enterprise host; `None` is github.com.
    pub fn new(hostname: Option<String>, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            cli: CliRunner::new(ProviderKind::GitHub, "gh", timeout, policy).with_hostname(hostname),
        }
    }
}

#[async_trait]
impl GitProvider for GitHubClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn authenticated_user(&self) -> Result<String> {
        let user: AuthUser = self.cli.run_json(&["api", "/user"]).await?;
        Ok(user.login)
    }

    async fn get_profile(&self, username: &str) -> Result<Profile> {
        tracing::info!("Fetching GitHub profile: {}", username);
        let endpoint = format!("/users/{}", username);
        let user: GhUser = self
            .cli
            .run_json(&["api", &endpoint])
            .await
            .map_err(|e| user_lookup_error(e, username, ProviderKind::GitHub))?;
        Ok(normalize_profile(user))
    }

    async fn get_repositories(&self, username: &str) -> Result<Vec<Repo>> {
        tracing::info!("Fetching GitHub repositories for: {}", username);
        let repos: Vec<GhRepo> = fetch_all_pages(REPOS_PER_PAGE, |page| async move {
            let endpoint = format!(
                "/users/{}/repos?type=owner&sort=updated&per_page={}&page={}",
                username, REPOS_PER_PAGE, page
            );
            let items: Vec<GhRepo> = self.cli.run_json(&["api", &endpoint]).await?;
            Ok(Page::new(items))
        })
        .await
        .map_err(|e| user_lookup_error(e, username, ProviderKind::GitHub))?;

        Ok(repos.into_iter().map(normalize_repo).collect())
    }

    async fn get_contribution_calendar(&self, username: &str) -> Result<ContributionCalendar> {
        tracing::info!("Fetching GitHub contribution calendar for: {}", username);
        let query = format!("query={}", CALENDAR_QUERY);
        let login = format!("login={}", username);
        let response = self
            .cli
            .run_json(&["api", "graphql", "-f", &query, "-f", &login])
            .await;
        calendar_for_user(response, username)
    }

    async fn search_items(&self, username: &str, category: SearchCategory) -> Result<SearchResult> {
        let search = SearchQuery::for_category(category, username);
        tracing::debug!("Searching GitHub: {}", search);

        let query = format!("query={}", SEARCH_QUERY);
        let q = format!("q={}", search);
        let first = format!("first={}", SEARCH_SAMPLE_SIZE);
        let response: GraphQlResponse<SearchData> = self
            .cli
            .run_json(&["api", "graphql", "-f", &query, "-f", &q, "-F", &first])
            .await?;

        parse_search(response)
    }
}

fn normalize_profile(user: GhUser) -> Profile {
    Profile {
        login: user.login,
        display_name: user.name.filter(|n| !n.is_empty()),
        avatar_url: user.avatar_url,
        bio: user.bio.filter(|b| !b.is_empty()),
        location: user.location.filter(|l| !l.is_empty()),
        followers: user.followers,
        following: user.following,
        joined_at: user.created_at,
    }
}

fn normalize_repo(repo: GhRepo) -> Repo {
    Repo {
        name: repo.name,
        stars: Some(repo.stargazers_count),
        forks: Some(repo.forks_count),
        primary_language: repo.language,
        is_fork: repo.fork,
        pushed_at: repo.pushed_at,
    }
}

/// A missing user fails either in `gh` itself or as a null `user` node;
/// both surface as `UserNotFound`.
fn calendar_for_user(
    response: Result<GraphQlResponse<CalendarData>>,
    username: &str,
) -> Result<ContributionCalendar> {
    response
        .and_then(parse_calendar)
        .map_err(|e| user_lookup_error(e, username, ProviderKind::GitHub))
}

fn parse_calendar(response: GraphQlResponse<CalendarData>) -> Result<ContributionCalendar> {
    let user = response
        .into_data()?
        .user
        .ok_or_else(|| Error::NotFound("GraphQL user is null".to_string()))?;

    let days: Vec<(NaiveDate, u32)> = user
        .contributions_collection
        .contribution_calendar
        .weeks
        .into_iter()
        .flat_map(|week| week.contribution_days)
        .map(|day| (day.date, day.contribution_count))
        .collect();

    Ok(match days.iter().map(|(date, _)| *date).max() {
        Some(end) => ContributionCalendar::trailing_window(days, end),
        None => ContributionCalendar::default(),
    })
}

fn parse_search(response: GraphQlResponse<SearchData>) -> Result<SearchResult> {
    let search = response.into_data()?.search;
    let items = search
        .nodes
        .into_iter()
        .filter_map(|node| {
            Some(SearchItem {
                title: node.title?,
                url: node.url.unwrap_or_default(),
                repo: node
                    .repository
                    .map(|r| r.name_with_owner)
                    .unwrap_or_default(),
                number: node.number,
            })
        })
        .collect();

    Ok(SearchResult::exact(search.issue_count, items))
}
