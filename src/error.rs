use thiserror::Error;

use crate::models::{FetchOperation, ProviderKind};

#[derive(Error, Debug)]
pub enum Error {
    #[error("No credential configured for {provider}")]
    CredentialMissing { provider: ProviderKind, hint: String },

    #[error("`{program}` is not installed")]
    CliMissing { program: String, hint: String },

    #[error("Authentication failed for {provider}: {message}")]
    AuthenticationFailed { provider: ProviderKind, message: String },

    #[error("Network error: {0}")]
    NetworkTransient(String),

    #[error("Rate limit exceeded{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    #[error("Unexpected response: {0}")]
    ResponseMalformed(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("{provider} does not support {capability}")]
    ProviderUnsupported { provider: ProviderKind, capability: String },

    #[error("User '{username}' not found on {provider}")]
    UserNotFound { username: String, provider: ProviderKind },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("`{program}` failed: {message}")]
    CliFailed { program: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetching {operation} failed: {source}")]
    FetchFailed {
        operation: FetchOperation,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, Error>;

fn retry_suffix(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry after {} seconds", secs),
        None => String::new(),
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::ResponseMalformed(err.to_string())
        } else {
            // Timeouts, connection resets and body read failures
            Error::NetworkTransient(err.to_string())
        }
    }
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NetworkTransient(_) | Error::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Remediation text shown below the error message, when there is one.
    pub fn hint(&self) -> Option<String> {
        match self {
            Error::CredentialMissing { hint, .. } | Error::CliMissing { hint, .. } => {
                Some(hint.clone())
            }
            Error::AuthenticationFailed { provider, .. } => Some(provider.login_hint()),
            Error::RateLimited { .. } => Some("Wait a few minutes before trying again".to_string()),
            Error::NetworkTransient(_) => {
                Some("Check your network connection and try again".to_string())
            }
            Error::UserNotFound { provider, .. } => {
                Some(format!("Verify the username is correct for {}", provider))
            }
            Error::FetchFailed { source, .. } => source.hint(),
            _ => None,
        }
    }

    /// The operation that failed, for errors raised by the fetch fan-out.
    pub fn failed_operation(&self) -> Option<FetchOperation> {
        match self {
            Error::FetchFailed { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    pub(crate) fn fetch_failed(operation: FetchOperation, source: Error) -> Self {
        Error::FetchFailed {
            operation,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::NetworkTransient("reset".into()).is_retryable());
        assert!(Error::RateLimited { retry_after: Some(3) }.is_retryable());
        assert!(!Error::ResponseMalformed("bad".into()).is_retryable());
        assert!(!Error::AuthenticationFailed {
            provider: ProviderKind::Gitea,
            message: "401".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_fetch_failed_keeps_operation_and_hint() {
        let err = Error::fetch_failed(
            FetchOperation::ContributionCalendar,
            Error::CliMissing {
                program: "gh".into(),
                hint: "Install gh".into(),
            },
        );
        assert_eq!(err.failed_operation(), Some(FetchOperation::ContributionCalendar));
        assert_eq!(err.hint().as_deref(), Some("Install gh"));
        assert!(err.to_string().contains("contribution calendar"));
    }

    #[test]
    fn test_rate_limited_message() {
        let err = Error::RateLimited { retry_after: Some(30) };
        assert_eq!(err.to_string(), "Rate limit exceeded, retry after 30 seconds");
        let err = Error::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limit exceeded");
    }
}
