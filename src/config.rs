use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{Credential, ProviderKind, SecretToken};

pub const DEFAULT_CACHE_TTL_MINUTES: u32 = 15;
pub const MAX_CACHE_TTL_MINUTES: u32 = 1440;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub provider_url: String,
    pub credential: Credential,
    pub username: Option<String>,
    pub cache_path: PathBuf,
    pub cache_ttl_minutes: u32,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("GITFETCH_PROVIDER") {
            Some(value) => ProviderKind::parse(&value).ok_or_else(|| {
                Error::Config(format!(
                    "Unknown provider '{}' (expected github, gitlab, gitea or sourcehut)",
                    value
                ))
            })?,
            None => ProviderKind::GitHub,
        };

        let provider_url = resolve_provider_url(provider, get("GITFETCH_PROVIDER_URL"))?;

        let credential = match provider.cli_program() {
            Some(program) => Credential::CliSession {
                program: program.to_string(),
            },
            None => provider
                .token_env_var()
                .and_then(|var| get(var))
                .and_then(SecretToken::new)
                .map(Credential::Token)
                .unwrap_or(Credential::None),
        };

        let username = get("GITFETCH_USERNAME").map(|u| u.trim().to_string());

        let cache_path = get("GITFETCH_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_path);

        let cache_ttl_minutes = get("GITFETCH_CACHE_TTL_MINUTES")
            .and_then(|v| v.parse().ok())
            .map(clamp_ttl)
            .unwrap_or(DEFAULT_CACHE_TTL_MINUTES);

        let request_timeout = get("GITFETCH_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs.clamp(10, 30))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let max_retries = get("GITFETCH_MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        Ok(Self {
            provider,
            provider_url,
            credential,
            username,
            cache_path,
            cache_ttl_minutes,
            request_timeout: Duration::from_secs(request_timeout),
            max_retries,
        })
    }

    /// Switches provider, re-resolving the URL and credential for it.
    pub fn with_provider(
        self,
        provider: ProviderKind,
        url: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        self.with_provider_from(provider, url, token, |key| env::var(key).ok())
    }

    /// Like `with_provider`, reading a fallback token from `lookup`.
    pub fn with_provider_from(
        mut self,
        provider: ProviderKind,
        url: Option<String>,
        token: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let provider_changed = provider != self.provider;
        let url = url.or_else(|| (!provider_changed).then(|| self.provider_url.clone()));
        self.provider_url = resolve_provider_url(provider, url)?;

        self.credential = match provider.cli_program() {
            Some(program) => Credential::CliSession {
                program: program.to_string(),
            },
            None => match token.and_then(SecretToken::new) {
                Some(token) => Credential::Token(token),
                None if provider_changed => provider
                    .token_env_var()
                    .and_then(|var| lookup(var))
                    .and_then(SecretToken::new)
                    .map(Credential::Token)
                    .unwrap_or(Credential::None),
                None => self.credential,
            },
        };
        self.provider = provider;
        Ok(self)
    }
}

fn resolve_provider_url(provider: ProviderKind, url: Option<String>) -> Result<String> {
    url.map(|u| u.trim().trim_end_matches('/').to_string())
        .or_else(|| provider.default_url().map(str::to_string))
        .ok_or_else(|| {
            Error::Config(format!(
                "{} requires an instance URL (set GITFETCH_PROVIDER_URL, e.g. https://codeberg.org)",
                provider
            ))
        })
}

pub fn clamp_ttl(minutes: u32) -> u32 {
    minutes.clamp(1, MAX_CACHE_TTL_MINUTES)
}

pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("gitfetch")
        .join("cache.db")
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub cache_ttl_minutes: u32,
    pub cache_bypass: bool,
}

impl From<&Config> for FetchConfig {
    fn from(config: &Config) -> Self {
        Self {
            cache_ttl_minutes: config.cache_ttl_minutes,
            cache_bypass: false,
        }
    }
}
