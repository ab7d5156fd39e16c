//! Shared HTTP plumbing for the remote embedding, storage and generation
//! adapters: client construction with timeouts, and bounded retries with
//! exponential backoff for rate limits, server errors and transport hiccups.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::config::RequestConfig;

/// Retry schedule applied to every remote call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retry failures after which the server may have acted on the request:
    /// timeouts, 5xx and errors mid-exchange. Off for non-idempotent writes.
    pub retry_ambiguous: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            retry_ambiguous: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RequestConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            ..Self::default()
        }
    }

    /// Policy for non-idempotent writes. Only failures that guarantee the
    /// request was not processed are retried: refused or failed connections
    /// and 429 rate limiting.
    pub fn for_writes(config: &RequestConfig) -> Self {
        Self {
            retry_ambiguous: false,
            ..Self::from_config(config)
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn retries_status(&self, status: StatusCode) -> bool {
        if self.retry_ambiguous {
            should_retry(status)
        } else {
            status == StatusCode::TOO_MANY_REQUESTS
        }
    }

    fn retries_error(&self, err: &reqwest::Error) -> bool {
        if self.retry_ambiguous {
            is_retryable_error(err)
        } else {
            err.is_connect()
        }
    }
}

/// Build a client with request and connect timeouts.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    build_client_with_headers(timeout, HeaderMap::new())
}

/// Same as [`build_client`], sending `headers` with every request.
pub fn build_client_with_headers(timeout: Duration, headers: HeaderMap) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5).min(timeout))
        .default_headers(headers)
        .build()
}

pub(crate) fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// Send a request, retrying transient failures.
///
/// `make_request` is called once per attempt since a sent builder is
/// consumed. On a non-success status the response body is folded into the
/// returned message; callers wrap it in their own error variant.
pub(crate) async fn send_with_retry<F>(
    policy: &RetryPolicy,
    label: &str,
    mut make_request: F,
) -> Result<Response, String>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let last_attempt = attempt >= policy.max_attempts;
        match make_request().send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                let status = resp.status();
                let body = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if policy.retries_status(status) && !last_attempt {
                    let delay = policy.backoff(attempt);
                    warn!(label, status = %status, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(format!("{label} failed ({status}): {body}"));
            }
            Err(err) => {
                if policy.retries_error(&err) && !last_attempt {
                    let delay = policy.backoff(attempt);
                    warn!(label, error = %err, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(format!("{label} request failed: {err}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(5), Duration::from_secs(8));
        assert_eq!(policy.backoff(40), Duration::from_secs(8));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::SERVICE_UNAVAILABLE));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_policy_from_config() {
        let config = RequestConfig {
            max_retries: 5,
            ..Default::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 5);
        assert_eq!(RetryPolicy::none().max_attempts, 1);
        assert!(RetryPolicy::from_config(&config).retry_ambiguous);
    }

    #[test]
    fn test_write_policy_retries_only_unprocessed_requests() {
        let config = RequestConfig {
            max_retries: 4,
            ..Default::default()
        };
        let policy = RetryPolicy::for_writes(&config);
        assert_eq!(policy.max_attempts, 4);
        assert!(!policy.retry_ambiguous);
        assert!(policy.retries_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!policy.retries_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!policy.retries_status(StatusCode::BAD_GATEWAY));
        assert!(!policy.retries_status(StatusCode::GATEWAY_TIMEOUT));

        let reads = RetryPolicy::from_config(&config);
        assert!(reads.retries_status(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn test_write_policy_still_retries_refused_connections() {
        let client = build_client(Duration::from_secs(2)).unwrap();
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            retry_ambiguous: false,
        };
        let mut calls = 0;
        let result = send_with_retry(&policy, "insert", || {
            calls += 1;
            client.post("http://127.0.0.1:9/rpc/insert_document")
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_connection_refused_gives_up_after_policy() {
        let client = build_client(Duration::from_secs(2)).unwrap();
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            retry_ambiguous: true,
        };
        let mut calls = 0;
        let result = send_with_retry(&policy, "unreachable", || {
            calls += 1;
            client.get("http://127.0.0.1:9/unreachable")
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }
}
