//! HTTP document fetcher with bounded retries.
//!
//! Every failure (connect error, timeout, non-success status, unreadable body)
//! is retried until the attempt budget is spent, sleeping
//! `base_delay * 2^attempt` between attempts. The fetcher holds no mutable
//! state, so one instance can serve any number of concurrent fetches.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, error, warn};

use billtracker_shared::{BillTrackerError, FetchConfig, Result};

/// User-Agent string for upstream requests.
const USER_AGENT: &str = concat!("billtracker/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Exponent cap so the delay computation cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Attempt budget and backoff base for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each later one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.min(MAX_BACKOFF_EXPONENT))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// `op` receives the 0-based attempt index; `sleep` is awaited between
/// attempts. After the last failure the error is returned as a value.
pub async fn retry_with_backoff<T, Op, OpFut, Sl, SlFut>(
    policy: &RetryPolicy,
    url: &str,
    mut op: Op,
    mut sleep: Sl,
) -> Result<T>
where
    Op: FnMut(u32) -> OpFut,
    OpFut: Future<Output = Result<T>>,
    Sl: FnMut(Duration) -> SlFut,
    SlFut: Future<Output = ()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(url, attempt = attempt + 1, max_attempts, error = %e, "fetch attempt failed");

                if attempt + 1 >= max_attempts {
                    error!(url, attempts = max_attempts, "giving up after exhausting retries");
                    return Err(BillTrackerError::Network(format!(
                        "{url}: failed after {max_attempts} attempts: {e}"
                    )));
                }

                let delay = policy.delay_after(attempt);
                debug!(url, delay_ms = delay.as_millis() as u64, "backing off");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentFetcher
// ---------------------------------------------------------------------------

/// Options for building a [`DocumentFetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Default retry policy.
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchOptions {
    fn from(config: &FetchConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: config.backoff_base(),
            },
        }
    }
}

/// Timed HTTP GET with retries. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl DocumentFetcher {
    /// Create a fetcher with its own HTTP client.
    pub fn new(opts: &FetchOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(opts.timeout)
            .build()
            .map_err(|e| BillTrackerError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry: opts.retry,
        })
    }

    /// Fetch `url` with the configured attempt budget.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        self.fetch_with_retry(url, self.retry.max_attempts).await
    }

    /// Fetch `url`, making at most `max_attempts` attempts.
    pub async fn fetch_with_retry(&self, url: &str, max_attempts: u32) -> Result<String> {
        let policy = RetryPolicy {
            max_attempts,
            ..self.retry
        };
        retry_with_backoff(&policy, url, |_| self.fetch_once(url), tokio::time::sleep).await
    }

    /// A single GET; non-success statuses are errors.
    async fn fetch_once(&self, url: &str) -> Result<String> {
        debug!(url, "fetching document");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BillTrackerError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BillTrackerError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| BillTrackerError::Network(format!("{url}: body read failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn fast_options(max_attempts: u32) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(10),
            },
        }
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
        };
        assert_eq!(policy.delay_after(0), Duration::from_millis(250));
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt_after_two_sleeps() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        let calls = Cell::new(0u32);
        let sleeps = RefCell::new(Vec::new());

        let result = retry_with_backoff(
            &policy,
            "https://example.com/bill",
            |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 2 {
                        Err(BillTrackerError::Network("HTTP 503".into()))
                    } else {
                        Ok("bill text".to_string())
                    }
                }
            },
            |delay| {
                sleeps.borrow_mut().push(delay);
                async {}
            },
        )
        .await;

        assert_eq!(result.unwrap(), "bill text");
        assert_eq!(calls.get(), 3);
        assert_eq!(
            sleeps.into_inner(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_always_failing_stops_after_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        let calls = Cell::new(0u32);
        let sleeps = RefCell::new(Vec::new());

        let result: Result<String> = retry_with_backoff(
            &policy,
            "https://example.com/bill",
            |_| {
                calls.set(calls.get() + 1);
                async { Err(BillTrackerError::Network("connection refused".into())) }
            },
            |delay| {
                sleeps.borrow_mut().push(delay);
                async {}
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_network());
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(calls.get(), 3);
        assert_eq!(sleeps.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_recovers_from_server_errors() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/bill"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/bill"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<pre>ok</pre>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = DocumentFetcher::new(&fast_options(3)).unwrap();
        let body = fetcher
            .fetch(&format!("{}/bill", server.uri()))
            .await
            .expect("third attempt succeeds");
        assert_eq!(body, "<pre>ok</pre>");
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(500)),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("on time"))
            .expect(1)
            .mount(&server)
            .await;

        let opts = FetchOptions {
            timeout: Duration::from_millis(100),
            ..fast_options(2)
        };
        let fetcher = DocumentFetcher::new(&opts).unwrap();
        let body = fetcher
            .fetch(&format!("{}/bill", server.uri()))
            .await
            .expect("retry after timeout succeeds");
        assert_eq!(body, "on time");
    }

    #[tokio::test]
    async fn test_timeout_on_every_attempt_is_network_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let opts = FetchOptions {
            timeout: Duration::from_millis(100),
            ..fast_options(2)
        };
        let fetcher = DocumentFetcher::new(&opts).unwrap();
        let err = fetcher
            .fetch(&format!("{}/bill", server.uri()))
            .await
            .unwrap_err();
        assert!(err.is_network());
        assert!(err.to_string().contains("after 2 attempts"));
    }

    #[tokio::test]
    async fn test_fetch_gives_up_on_persistent_404() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = DocumentFetcher::new(&fast_options(3)).unwrap();
        let result = fetcher
            .fetch_with_retry(&format!("{}/missing", server.uri()), 2)
            .await;
        assert!(result.is_err());
    }
}
