//! Rate-Limited Fetcher
//!
//! Every outbound GET goes through here: fixed timeout, a pacing delay in
//! front of the first attempt, and exponential backoff on HTTP 429.
//! TonAPI's anonymous tier tolerates roughly one request per second, so the
//! pacing delay is what keeps a full pass under the limit; the backoff only
//! handles the bursts that slip through.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

// ============================================
// ERRORS
// ============================================

#[derive(Debug, Error)]
pub enum FetchError {
    /// Still throttled after exhausting the retry budget
    #[error("rate limited by {url} after {attempts} attempts")]
    Throttled { url: String, attempts: u32 },

    /// Non-success status other than 429
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Connection, TLS or timeout failure
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Body was not the JSON shape we expected
    #[error("unexpected payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn is_throttle(&self) -> bool {
        matches!(
            self,
            FetchError::Throttled { .. }
                | FetchError::Status {
                    status: 429,
                    ..
                }
        )
    }
}

// ============================================
// RETRY POLICY
// ============================================

/// Which failures are worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Only HTTP 429 is retried
    OnThrottle,
    /// Every failure is retried (balance lookups)
    OnAnyError,
}

impl RetryMode {
    fn should_retry(&self, error: &FetchError) -> bool {
        match self {
            RetryMode::OnThrottle => error.is_throttle(),
            RetryMode::OnAnyError => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled each time
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

// ============================================
// FETCHER
// ============================================

pub struct RateLimitedFetcher {
    http_client: Client,
    pacing: Duration,
    retry: RetryPolicy,
    bearer: Option<String>,
}

impl RateLimitedFetcher {
    pub fn new(
        timeout: Duration,
        pacing: Duration,
        retry: RetryPolicy,
        bearer: Option<String>,
    ) -> eyre::Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            pacing,
            retry,
            bearer,
        })
    }

    /// GET `url` and decode the JSON body.
    ///
    /// The pacing delay is applied once, before the first attempt; retries
    /// wait out the backoff instead.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        mode: RetryMode,
    ) -> Result<T, FetchError> {
        if !self.pacing.is_zero() {
            sleep(self.pacing).await;
        }

        let mut retry = 0;
        loop {
            match self.attempt(url, query).await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.retry.max_retries && mode.should_retry(&e) => {
                    let wait = self.retry.delay_for(retry);
                    if e.is_throttle() {
                        warn!("Rate limited by {}, waiting {:?}...", url, wait);
                    } else {
                        debug!("{} (retrying in {:?})", e, wait);
                    }
                    sleep(wait).await;
                    retry += 1;
                }
                Err(e) if e.is_throttle() => {
                    return Err(FetchError::Throttled {
                        url: url.to_string(),
                        attempts: retry + 1,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        trace!("GET {} {:?}", url, query);

        let mut request = self.http_client.get(url).query(query);
        if let Some(ref key) = self.bearer {
            request = request.bearer_auth(key);
        }

        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    /// Serve `router` on an ephemeral port and return its base URL
    pub(crate) async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[derive(Clone)]
    struct Flaky {
        hits: Arc<AtomicUsize>,
        failures: usize,
        status: AxumStatus,
    }

    async fn flaky(State(state): State<Flaky>) -> Response {
        let hit = state.hits.fetch_add(1, Ordering::SeqCst);
        if hit < state.failures {
            (state.status, "nope").into_response()
        } else {
            Json(json!({ "ok": true })).into_response()
        }
    }

    async fn flaky_server(failures: usize, status: AxumStatus) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new().route("/flaky", get(flaky)).with_state(Flaky {
            hits: hits.clone(),
            failures,
            status,
        });
        let base = spawn_server(router).await;
        (format!("{}/flaky", base), hits)
    }

    fn fetcher(pacing_ms: u64) -> RateLimitedFetcher {
        RateLimitedFetcher::new(
            Duration::from_secs(5),
            Duration::from_millis(pacing_ms),
            RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(5),
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_retries_through_throttling() {
        let (url, hits) = flaky_server(2, AxumStatus::TOO_MANY_REQUESTS).await;

        let value: Value = fetcher(0)
            .get_json(&url, &[], RetryMode::OnThrottle)
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let (url, hits) = flaky_server(usize::MAX, AxumStatus::TOO_MANY_REQUESTS).await;

        let err = fetcher(0)
            .get_json::<Value>(&url, &[], RetryMode::OnThrottle)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Throttled { attempts: 4, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_server_error_not_retried_by_default() {
        let (url, hits) = flaky_server(1, AxumStatus::INTERNAL_SERVER_ERROR).await;

        let err = fetcher(0)
            .get_json::<Value>(&url, &[], RetryMode::OnThrottle)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_any_error_mode_retries_server_errors() {
        let (url, hits) = flaky_server(2, AxumStatus::BAD_GATEWAY).await;

        let value: Value = fetcher(0)
            .get_json(&url, &[], RetryMode::OnAnyError)
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_decode_error_is_typed() {
        let router = Router::new().route("/text", get(|| async { "plain text" }));
        let base = spawn_server(router).await;

        let err = fetcher(0)
            .get_json::<Value>(&format!("{}/text", base), &[], RetryMode::OnThrottle)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_pacing_delay_applied() {
        let (url, _) = flaky_server(0, AxumStatus::OK).await;

        let start = Instant::now();
        let _: Value = fetcher(50)
            .get_json(&url, &[], RetryMode::OnThrottle)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
