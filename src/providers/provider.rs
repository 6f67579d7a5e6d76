use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ContributionCalendar, Profile, ProviderKind, Repo, SearchCategory, SearchResult};

/// Read-only statistics surface every hosting provider implements.
///
/// Capabilities a provider cannot answer return `Error::ProviderUnsupported`;
/// the orchestrator turns those into explicit "unavailable" markers.
#[async_trait]
pub trait GitProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Login of the account the configured credential belongs to.
    async fn authenticated_user(&self) -> Result<String>;

    async fn get_profile(&self, username: &str) -> Result<Profile>;

    /// All repositories owned by `username`, across every page.
    async fn get_repositories(&self, username: &str) -> Result<Vec<Repo>>;

    /// Per-day contributions over the trailing 371 days.
    async fn get_contribution_calendar(&self, username: &str) -> Result<ContributionCalendar>;

    async fn search_items(&self, username: &str, category: SearchCategory) -> Result<SearchResult>;
}
