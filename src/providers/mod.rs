pub mod provider;
pub mod retry;
pub mod paginator;
pub mod cli;
pub mod http;
pub mod graphql;
pub mod search_query;
pub mod github;
pub mod gitlab;
pub mod gitea;
pub mod sourcehut;

use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::ProviderKind;

use cli::cli_hostname;

pub use provider::GitProvider;
pub use retry::RetryPolicy;
pub use search_query::SearchQuery;
pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use gitea::GiteaClient;
pub use sourcehut::SourcehutClient;

pub const REPOS_PER_PAGE: usize = 100;

/// Number of sample items requested per search category.
pub const SEARCH_SAMPLE_SIZE: usize = 5;

/// Builds the client for the configured provider.
pub fn build_provider(config: &Config) -> Result<Arc<dyn GitProvider>> {
    let policy = RetryPolicy::new(config.max_retries);
    let token = config.credential.token().cloned();

    Ok(match config.provider {
        ProviderKind::GitHub => Arc::new(GitHubClient::new(
            cli_hostname(ProviderKind::GitHub, &config.provider_url),
            config.request_timeout,
            policy,
        )),
        ProviderKind::GitLab => Arc::new(GitLabClient::new(
            cli_hostname(ProviderKind::GitLab, &config.provider_url),
            config.request_timeout,
            policy,
        )),
        ProviderKind::Gitea => Arc::new(GiteaClient::new(
            &config.provider_url,
            token,
            config.request_timeout,
            policy,
        )?),
        ProviderKind::Sourcehut => Arc::new(SourcehutClient::new(
            &config.provider_url,
            token,
            config.request_timeout,
            policy,
        )?),
    })
}

/// Narrows a generic not-found error on a user lookup to `UserNotFound`.
pub(crate) fn user_lookup_error(err: Error, username: &str, provider: ProviderKind) -> Error {
    match err {
        Error::NotFound(_) => Error::UserNotFound {
            username: username.to_string(),
            provider,
        },
        other => other,
    }
}

pub(crate) fn unsupported(provider: ProviderKind, capability: impl Into<String>) -> Error {
    Error::ProviderUnsupported {
        provider,
        capability: capability.into(),
    }
}
