use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-normalized subset of a user profile. Fields a provider does not
/// expose stay `None` rather than defaulting to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub login: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub followers: Option<u64>,
    pub following: Option<u64>,
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repo {
    pub name: String,
    /// `None` where the provider has no notion of stars or forks.
    pub stars: Option<u64>,
    pub forks: Option<u64>,
    pub primary_language: Option<String>,
    pub is_fork: bool,
    pub pushed_at: Option<DateTime<Utc>>,
}
