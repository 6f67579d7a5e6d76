use reqwest::header::{self, HeaderMap};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Duration;

use crate::error::{Error, Result};
use crate::models::{ProviderKind, SecretToken};
use crate::providers::retry::{with_retry, RetryPolicy};

/// Decoded JSON body plus the headers it came with (pagination, totals).
pub struct JsonResponse<T> {
    pub body: T,
    pub headers: HeaderMap,
}

/// Bearer-token HTTP transport shared by the token-authenticated providers.
pub struct HttpTransport {
    client: Client,
    provider: ProviderKind,
    token: Option<SecretToken>,
    policy: RetryPolicy,
}

impl HttpTransport {
    pub fn new(
        provider: ProviderKind,
        token: Option<SecretToken>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("gitfetch/", env!("CARGO_PKG_VERSION"))),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider,
            token,
            policy,
        })
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    fn token(&self) -> Result<&SecretToken> {
        self.token.as_ref().ok_or_else(|| Error::CredentialMissing {
            provider: self.provider,
            hint: self.provider.login_hint(),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<JsonResponse<T>> {
        let token = self.token()?;
        with_retry(&self.policy, url, || async {
            tracing::debug!("GET {}", url);
            let request = self.client.get(url).bearer_auth(token.expose());
            self.send(request).await
        })
        .await
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.token()?;
        with_retry(&self.policy, url, || async {
            tracing::debug!("POST {}", url);
            let request = self.client.post(url).bearer_auth(token.expose()).json(body);
            self.send(request).await.map(|response: JsonResponse<T>| response.body)
        })
        .await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<JsonResponse<T>> {
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(self.provider, status, &headers, &body, unix_now()));
        }

        let body = response.json().await?;
        Ok(JsonResponse { body, headers })
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Maps a non-success HTTP status onto the error taxonomy.
pub fn classify_status(
    provider: ProviderKind,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now_epoch: u64,
) -> Error {
    let message = format!("{} {}", status, truncate(body, 200));

    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            retry_after: retry_after_secs(headers, now_epoch),
        },
        StatusCode::FORBIDDEN if is_rate_limited(headers) => Error::RateLimited {
            retry_after: retry_after_secs(headers, now_epoch),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::AuthenticationFailed { provider, message }
        }
        StatusCode::NOT_FOUND => Error::NotFound(message),
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            Error::NetworkTransient(message)
        }
        _ => Error::ResponseMalformed(message),
    }
}

fn is_rate_limited(headers: &HeaderMap) -> bool {
    headers.contains_key(header::RETRY_AFTER)
        || header_str(headers, "x-ratelimit-remaining") == Some("0")
}

/// Seconds to wait from `Retry-After`, falling back to `X-RateLimit-Reset`.
pub fn retry_after_secs(headers: &HeaderMap, now_epoch: u64) -> Option<u64> {
    if let Some(secs) = header_str(headers, header::RETRY_AFTER.as_str()).and_then(|v| v.parse().ok()) {
        return Some(secs);
    }

    header_str(headers, "x-ratelimit-reset")
        .and_then(|v| v.parse::<u64>().ok())
        .map(|reset| reset.saturating_sub(now_epoch))
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_unauthorized_is_authentication_failure() {
        let err = classify_status(
            ProviderKind::Gitea,
            StatusCode::UNAUTHORIZED,
            &HeaderMap::new(),
            "token is invalid",
            0,
        );
        assert!(matches!(err, Error::AuthenticationFailed { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_forbidden_with_exhausted_quota_is_rate_limited() {
        let err = classify_status(
            ProviderKind::Gitea,
            StatusCode::FORBIDDEN,
            &headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "1060")]),
            "",
            1000,
        );
        assert!(matches!(err, Error::RateLimited { retry_after: Some(60) }));
    }

    #[test]
    fn test_too_many_requests_honors_retry_after() {
        let err = classify_status(
            ProviderKind::Sourcehut,
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("retry-after", "7")]),
            "",
            0,
        );
        assert_eq!(err.retry_after(), Some(7));
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = classify_status(
            ProviderKind::Gitea,
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            "<html>bad gateway</html>",
            0,
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_token_fails_before_any_request() {
        let transport = HttpTransport::new(
            ProviderKind::Gitea,
            None,
            Duration::from_secs(10),
            RetryPolicy::immediate(1),
        )
        .unwrap();
        let err = transport.token().unwrap_err();
        assert!(matches!(err, Error::CredentialMissing { provider: ProviderKind::Gitea, .. }));
    }
}
