use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Gitea,
    Sourcehut,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::GitHub,
        ProviderKind::GitLab,
        ProviderKind::Gitea,
        ProviderKind::Sourcehut,
    ];

    /// Stable identifier used in configuration and as the cache key.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::GitLab => "gitlab",
            ProviderKind::Gitea => "gitea",
            ProviderKind::Sourcehut => "sourcehut",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "github" | "gh" => Some(ProviderKind::GitHub),
            "gitlab" | "glab" => Some(ProviderKind::GitLab),
            "gitea" | "forgejo" | "codeberg" => Some(ProviderKind::Gitea),
            "sourcehut" | "srht" | "sr.ht" => Some(ProviderKind::Sourcehut),
            _ => None,
        }
    }

    pub fn default_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::GitHub => Some("https://api.github.com"),
            ProviderKind::GitLab => Some("https://gitlab.com"),
            ProviderKind::Sourcehut => Some("https://git.sr.ht"),
            ProviderKind::Gitea => None,
        }
    }

    /// Environment variable holding the token for token-authenticated providers.
    pub fn token_env_var(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Gitea => Some("GITEA_TOKEN"),
            ProviderKind::Sourcehut => Some("SOURCEHUT_TOKEN"),
            ProviderKind::GitHub | ProviderKind::GitLab => None,
        }
    }

    /// External CLI owning the session for delegated-CLI providers.
    pub fn cli_program(&self) -> Option<&'static str> {
        match self {
            ProviderKind::GitHub => Some("gh"),
            ProviderKind::GitLab => Some("glab"),
            ProviderKind::Gitea | ProviderKind::Sourcehut => None,
        }
    }

    /// Whether repositories carry star and fork counts.
    pub fn reports_popularity(&self) -> bool {
        !matches!(self, ProviderKind::Sourcehut)
    }

    pub fn uses_delegated_cli(&self) -> bool {
        self.cli_program().is_some()
    }

    pub fn login_hint(&self) -> String {
        match (self.cli_program(), self.token_env_var()) {
            (Some(program), _) => format!("Run '{} auth login' and try again", program),
            (None, Some(var)) => format!("Set {} to a valid personal access token", var),
            (None, None) => "Check your credentials".to_string(),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::GitHub => write!(f, "GitHub"),
            ProviderKind::GitLab => write!(f, "GitLab"),
            ProviderKind::Gitea => write!(f, "Gitea"),
            ProviderKind::Sourcehut => write!(f, "Sourcehut"),
        }
    }
}

/// A bearer token. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Authentication state is owned by an external, pre-authenticated CLI.
    CliSession { program: String },
    Token(SecretToken),
    None,
}

impl Credential {
    pub fn token(&self) -> Option<&SecretToken> {
        match self {
            Credential::Token(token) => Some(token),
            _ => None,
        }
    }
}

/// The four independent units of work dispatched per live fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FetchOperation {
    Profile,
    Repositories,
    ContributionCalendar,
    Search,
}

impl std::fmt::Display for FetchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchOperation::Profile => write!(f, "profile"),
            FetchOperation::Repositories => write!(f, "repositories"),
            FetchOperation::ContributionCalendar => write!(f, "contribution calendar"),
            FetchOperation::Search => write!(f, "pull request and issue search"),
        }
    }
}
