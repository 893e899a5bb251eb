use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::ProviderError;

/// Response bodies quoted in errors are cut to this many characters.
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        Self {
            max_attempts: cfg.max_retries.max(1),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
        }
    }

    /// Delay after the failed attempt numbered `attempt` (0-based): base * 2^attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// GET a JSON document, retrying transient failures with exponential backoff.
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed by
/// `send`. Client errors and undecodable bodies fail immediately.
pub async fn get_json<T, F>(label: &str, policy: &RetryPolicy, build: F) -> Result<T, ProviderError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        match send_once(build()).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_retryable() => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    warn!(label, attempts = attempt, "giving up: {e}");
                    return Err(ProviderError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "{e}; retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!(label, "not retrying: {e}");
                return Err(e);
            }
        }
    }
}

async fn send_once<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, ProviderError> {
    let response = req.send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }
    if status.is_server_error() {
        return Err(ProviderError::Server(status.as_u16()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Client {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
        };
        assert_eq!(p.delay_for(0), Duration::from_secs(1));
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/q"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/q"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/q", server.uri());
        let body: serde_json::Value = get_json("test", &fast_policy(), || client.get(&url))
            .await
            .unwrap();
        assert_eq!(body["ok"], 1);
    }

    #[tokio::test]
    async fn rate_limit_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let err = get_json::<serde_json::Value, _>("test", &fast_policy(), || client.get(&url))
            .await
            .unwrap_err();
        match err {
            ProviderError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ProviderError::RateLimited));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such symbol"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let err = get_json::<serde_json::Value, _>("test", &fast_policy(), || client.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Client { status: 404, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let url = server.uri();
        let err = get_json::<serde_json::Value, _>("test", &fast_policy(), || client.get(&url))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
