use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::models::{
    ContributionCalendar, Profile, ProviderKind, Repo, SearchCategory, SearchResult, SecretToken,
};
use crate::providers::graphql::{GraphQlRequest, GraphQlResponse};
use crate::providers::http::HttpTransport;
use crate::providers::paginator::{fetch_all_cursors, CursorPage};
use crate::providers::provider::GitProvider;
use crate::providers::retry::RetryPolicy;
use crate::providers::{unsupported, user_lookup_error};

const PROFILE_QUERY: &str = r#"query($username: String!) {
  userByName(username: $username) { username created location bio }
}"#;

const REPOSITORIES_QUERY: &str = r#"query($username: String!, $cursor: Cursor) {
  user(username: $username) {
    repositories(cursor: $cursor) { results { name updated } cursor }
  }
}"#;

const ME_QUERY: &str = "query { me { username } }";

/// Sourcehut through the meta.sr.ht and git.sr.ht GraphQL APIs.
///
/// Sourcehut has no contribution calendar, stars, forks or cross-repository
/// search; those capabilities report as unsupported rather than as zeros.
pub struct SourcehutClient {
    http: HttpTransport,
    git_endpoint: String,
    meta_endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileData {
    user_by_name: Option<SrhtUser>,
}

#[derive(Debug, Deserialize)]
struct SrhtUser {
    username: String,
    created: Option<DateTime<Utc>>,
    location: Option<String>,
    bio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoriesData {
    user: Option<RepositoriesUser>,
}

#[derive(Debug, Deserialize)]
struct RepositoriesUser {
    repositories: RepositoryCursor,
}

#[derive(Debug, Deserialize)]
struct RepositoryCursor {
    results: Vec<SrhtRepo>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SrhtRepo {
    name: String,
    updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MeData {
    me: MeUser,
}

#[derive(Debug, Deserialize)]
struct MeUser {
    username: String,
}

impl SourcehutClient {
    pub fn new(
        git_url: &str,
        token: Option<SecretToken>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let git_url = git_url.trim_end_matches('/');
        if git_url.is_empty() {
            return Err(Error::Config("Sourcehut requires a git.sr.ht URL".to_string()));
        }

        Ok(Self {
            http: HttpTransport::new(ProviderKind::Sourcehut, token, timeout, policy)?,
            git_endpoint: format!("{}/query", git_url),
            meta_endpoint: format!("{}/query", meta_url(git_url)),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let request = GraphQlRequest { query, variables };
        let response: GraphQlResponse<T> = self.http.post_json(endpoint, &request).await?;
        response.into_data()
    }
}

/// `https://git.sr.ht` -> `https://meta.sr.ht`. Self-hosted instances that do
/// not follow the `git.` naming keep the same host.
fn meta_url(git_url: &str) -> String {
    match git_url.split_once("://") {
        Some((scheme, host)) if host.starts_with("git.") => {
            format!("{}://meta.{}", scheme, &host["git.".len()..])
        }
        _ => git_url.to_string(),
    }
}

#[async_trait]
impl GitProvider for SourcehutClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sourcehut
    }

    async fn authenticated_user(&self) -> Result<String> {
        let data: MeData = self.query(&self.meta_endpoint, ME_QUERY, json!({})).await?;
        Ok(data.me.username)
    }

    async fn get_profile(&self, username: &str) -> Result<Profile> {
        tracing::info!("Fetching Sourcehut profile: {}", username);
        let username = username.trim_start_matches('~');
        let data: ProfileData = self
            .query(&self.meta_endpoint, PROFILE_QUERY, json!({ "username": username }))
            .await
            .map_err(|e| user_lookup_error(e, username, ProviderKind::Sourcehut))?;

        data.user_by_name
            .map(normalize_profile)
            .ok_or_else(|| Error::UserNotFound {
                username: username.to_string(),
                provider: ProviderKind::Sourcehut,
            })
    }

    async fn get_repositories(&self, username: &str) -> Result<Vec<Repo>> {
        tracing::info!("Fetching Sourcehut repositories for: {}", username);
        let username = username.trim_start_matches('~');
        let repos = fetch_all_cursors(|cursor| async move {
            let data: RepositoriesData = self
                .query(
                    &self.git_endpoint,
                    REPOSITORIES_QUERY,
                    json!({ "username": username, "cursor": cursor }),
                )
                .await?;
            let user = data
                .user
                .ok_or_else(|| Error::NotFound(format!("~{}", username)))?;
            Ok(CursorPage {
                items: user.repositories.results,
                next_cursor: user.repositories.cursor,
            })
        })
        .await
        .map_err(|e| user_lookup_error(e, username, ProviderKind::Sourcehut))?;

        Ok(repos.into_iter().map(normalize_repo).collect())
    }

    async fn get_contribution_calendar(&self, _username: &str) -> Result<ContributionCalendar> {
        Err(unsupported(ProviderKind::Sourcehut, "contribution calendars"))
    }

    async fn search_items(&self, _username: &str, category: SearchCategory) -> Result<SearchResult> {
        Err(unsupported(ProviderKind::Sourcehut, format!("searching {}", category)))
    }
}

fn normalize_profile(user: SrhtUser) -> Profile {
    Profile {
        login: user.username,
        display_name: None,
        avatar_url: None,
        bio: user.bio.filter(|b| !b.is_empty()),
        location: user.location.filter(|l| !l.is_empty()),
        followers: None,
        following: None,
        joined_at: user.created,
    }
}

fn normalize_repo(repo: SrhtRepo) -> Repo {
    Repo {
        name: repo.name,
        stars: None,
        forks: None,
        primary_language: None,
        is_fork: false,
        pushed_at: repo.updated,
    }
}
