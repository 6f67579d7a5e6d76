use std::process::{Output, Stdio};

use serde::de::DeserializeOwned;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::time::{timeout, Duration};

use crate::error::{Error, Result};
use crate::models::ProviderKind;
use crate::providers::retry::{with_retry, RetryPolicy};

/// Runs a pre-authenticated provider CLI (`gh`, `glab`) and decodes its output.
///
/// The session itself is owned by the external tool; this runner only checks
/// that the tool exists and is logged in, once per process.
pub struct CliRunner {
    provider: ProviderKind,
    program: String,
    timeout: Duration,
    policy: RetryPolicy,
    /// Instance host for self-managed servers; `None` targets the public one.
    hostname: Option<String>,
    authenticated: OnceCell<()>,
}

impl CliRunner {
    pub fn new(provider: ProviderKind, program: &str, timeout: Duration, policy: RetryPolicy) -> Self {
        Self {
            provider,
            program: program.to_string(),
            timeout,
            policy,
            hostname: None,
            authenticated: OnceCell::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Fails with `CliMissing` when the executable is absent and with
    /// `CredentialMissing` when it is present but not logged in.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        self.authenticated
            .get_or_try_init(|| async {
                let output = self.spawn(&["auth", "status"]).await?;
                if output.status.success() {
                    tracing::debug!("{} session is authenticated", self.program);
                    Ok(())
                } else {
                    Err(Error::CredentialMissing {
                        provider: self.provider,
                        hint: format!("Run '{} auth login' and try again", self.program),
                    })
                }
            })
            .await
            .map(|_| ())
    }

    /// Runs the CLI with `args`, retrying transient failures, and returns stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        self.ensure_authenticated().await?;

        let label = format!("{} {}", self.program, args.first().copied().unwrap_or_default());
        with_retry(&self.policy, &label, || async {
            let output = self.spawn(args).await?;
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(classify_failure(self.provider, &self.program, &stderr))
            }
        })
        .await
    }

    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let stdout = self.run(args).await?;
        serde_json::from_str(&stdout).map_err(|e| {
            Error::ResponseMalformed(format!("{} returned unexpected JSON: {}", self.program, e))
        })
    }

    async fn spawn(&self, args: &[&str]) -> Result<Output> {
        let args = command_args(args, self.hostname.as_deref());
        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                Error::NetworkTransient(format!(
                    "`{}` timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?;

        output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CliMissing {
                    program: self.program.clone(),
                    hint: install_hint(&self.program),
                }
            } else {
                Error::Io(e)
            }
        })
    }
}

/// Adds `--hostname` to `api` and `auth status` calls for non-default hosts.
/// Both `gh` and `glab` accept the flag on these subcommands.
fn command_args(args: &[&str], hostname: Option<&str>) -> Vec<String> {
    let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let Some(host) = hostname else {
        return full;
    };

    match args {
        ["api", ..] => {
            full.insert(1, host.to_string());
            full.insert(1, "--hostname".to_string());
        }
        ["auth", "status", ..] => {
            full.extend(["--hostname".to_string(), host.to_string()]);
        }
        _ => {}
    }
    full
}

/// Host to pass to a provider CLI for `url`, or `None` for the public instance.
pub fn cli_hostname(provider: ProviderKind, url: &str) -> Option<String> {
    let host = host_of(url)?;
    let default_host = provider.default_url().and_then(host_of);
    let public = |h: &str| h.strip_prefix("api.").unwrap_or(h).to_string();

    match default_host {
        Some(default) if public(&default) == public(&host) => None,
        _ => Some(host),
    }
}

fn host_of(url: &str) -> Option<String> {
    let rest = url.trim();
    let rest = rest
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(rest);
    let host = rest.split('/').next().unwrap_or_default().to_lowercase();
    (!host.is_empty()).then_some(host)
}

fn install_hint(program: &str) -> String {
    match program {
        "gh" => "Install the GitHub CLI (https://cli.github.com), then run 'gh auth login'".to_string(),
        "glab" => "Install the GitLab CLI (https://gitlab.com/gitlab-org/cli), then run 'glab auth login'"
            .to_string(),
        other => format!("Install '{}' and make sure it is on PATH", other),
    }
}

/// Maps a failed CLI invocation onto the error taxonomy using its stderr.
pub fn classify_failure(provider: ProviderKind, program: &str, stderr: &str) -> Error {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    if lower.contains("rate limit") {
        return Error::RateLimited { retry_after: None };
    }

    match http_status_in(&message) {
        Some(401) | Some(403) => {
            return Error::AuthenticationFailed { provider, message };
        }
        Some(404) => return Error::NotFound(message),
        Some(429) => return Error::RateLimited { retry_after: None },
        Some(status) if status >= 500 => return Error::NetworkTransient(message),
        _ => {}
    }

    if lower.contains("could not resolve to") {
        return Error::NotFound(message);
    }

    if lower.contains("bad credentials")
        || lower.contains("not logged")
        || lower.contains("authentication")
        || lower.contains("unauthorized")
    {
        Error::AuthenticationFailed { provider, message }
    } else if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("could not resolve host")
        || lower.contains("eof")
    {
        Error::NetworkTransient(message)
    } else if lower.contains("not found") {
        Error::NotFound(message)
    } else {
        Error::CliFailed {
            program: program.to_string(),
            message,
        }
    }
}

/// Extracts the status code from CLI messages such as `HTTP 502: Bad Gateway`
/// or `404 Not Found`.
fn http_status_in(message: &str) -> Option<u16> {
    if let Some(pos) = message.find("HTTP ") {
        let digits: String = message[pos + 5..].chars().take(3).collect();
        if let Ok(status) = digits.parse() {
            return Some(status);
        }
    }

    message
        .split(|c: char| !c.is_ascii_digit())
        .find(|word| word.len() == 3)
        .and_then(|word| word.parse().ok())
        .filter(|status| (400..600).contains(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(stderr: &str) -> Error {
        classify_failure(ProviderKind::GitHub, "gh", stderr)
    }

    #[test]
    fn test_classify_http_statuses() {
        assert!(matches!(
            classify("gh: Bad credentials (HTTP 401)"),
            Error::AuthenticationFailed { .. }
        ));
        assert!(matches!(classify("gh: Not Found (HTTP 404)"), Error::NotFound(_)));
        assert!(matches!(
            classify("HTTP 502: Bad Gateway (https://api.github.com/graphql)"),
            Error::NetworkTransient(_)
        ));
        assert!(matches!(
            classify("glab: 404 Not Found"),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_classify_rate_limit_before_status() {
        assert!(matches!(
            classify("gh: API rate limit exceeded for user ID 1. (HTTP 403)"),
            Error::RateLimited { .. }
        ));
    }

    #[test]
    fn test_classify_graphql_missing_user() {
        assert!(matches!(
            classify("gh: Could not resolve to a User with the login of 'nobody'."),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify("error connecting to api.github.com: could not resolve host"),
            Error::NetworkTransient(_)
        ));
    }

    #[test]
    fn test_classify_network_and_unknown() {
        assert!(matches!(
            classify("Post \"https://api.github.com/graphql\": dial tcp: connection refused"),
            Error::NetworkTransient(_)
        ));
        assert!(matches!(classify("unknown flag: --bogus"), Error::CliFailed { .. }));
    }

    #[test]
    fn test_hostname_flag_only_for_custom_hosts() {
        assert_eq!(command_args(&["api", "user"], None), vec!["api", "user"]);
        assert_eq!(
            command_args(&["api", "users/1"], Some("gitlab.example.com")),
            vec!["api", "--hostname", "gitlab.example.com", "users/1"]
        );
        assert_eq!(
            command_args(&["auth", "status"], Some("ghe.corp.net")),
            vec!["auth", "status", "--hostname", "ghe.corp.net"]
        );
        assert_eq!(command_args(&["version"], Some("ghe.corp.net")), vec!["version"]);
    }

    #[test]
    fn test_cli_hostname_from_url() {
        assert_eq!(cli_hostname(ProviderKind::GitHub, "https://api.github.com"), None);
        assert_eq!(cli_hostname(ProviderKind::GitHub, "https://github.com/"), None);
        assert_eq!(
            cli_hostname(ProviderKind::GitHub, "https://ghe.corp.net/api/v3"),
            Some("ghe.corp.net".to_string())
        );
        assert_eq!(cli_hostname(ProviderKind::GitLab, "https://GitLab.com"), None);
        assert_eq!(
            cli_hostname(ProviderKind::GitLab, "https://gitlab.example.com"),
            Some("gitlab.example.com".to_string())
        );
        assert_eq!(
            cli_hostname(ProviderKind::GitLab, "gitlab.example.com:8443"),
            Some("gitlab.example.com:8443".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_executable_is_distinct_error() {
        let runner = CliRunner::new(
            ProviderKind::GitHub,
            "gitfetch-definitely-not-installed",
            Duration::from_secs(5),
            RetryPolicy::immediate(1),
        );
        let err = runner.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, Error::CliMissing { .. }));
    }
}
