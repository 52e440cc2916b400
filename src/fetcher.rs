use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT,
};
use tracing::{debug, instrument, trace};

use crate::config::FetcherConfig;
use crate::error::{IngestError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// One cell per host, each letting a single request through per `delay`.
type HostLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// Rate-limited page retrieval shared by every extractor.
pub struct Fetcher {
    http: reqwest::Client,
    /// `None` when the configured delay is zero.
    limiter: Option<HostLimiter>,
}

impl Fetcher {
    /// Build a fetcher with a browser-like identity and the configured
    /// timeout and per-host delay.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT));
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, user_agent);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IngestError::Http {
                url: "<client>".to_owned(),
                source: e,
            })?;

        Ok(Self::with_client(
            http,
            Duration::from_millis(config.request_delay_ms),
        ))
    }

    /// Create a fetcher using the provided [`reqwest::Client`].
    pub fn with_client(http: reqwest::Client, delay: Duration) -> Self {
        Self {
            http,
            limiter: Quota::with_period(delay).map(RateLimiter::keyed),
        }
    }

    /// Wait until a request to `host` is allowed.
    async fn wait_for(&self, host: String) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check_key(&host).is_ok() {
            return;
        }
        trace!(host = %host, "throttling");
        limiter.until_key_ready(&host).await;
    }

    /// Fetch a URL and return the response body.
    ///
    /// Non-2xx responses and transport failures come back as network errors;
    /// nothing here retries.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String> {
        self.wait_for(host_of(url)).await;
        debug!(url, "fetching page");

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::Timeout {
                    url: url.to_owned(),
                }
            } else {
                IngestError::Http {
                    url: url.to_owned(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::UnexpectedStatus {
                url: url.to_owned(),
                status,
            });
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                IngestError::Timeout {
                    url: url.to_owned(),
                }
            } else {
                IngestError::ResponseBody {
                    url: url.to_owned(),
                    source: e,
                }
            }
        })
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://www.vlr.gg/matches"), "www.vlr.gg");
        assert_eq!(host_of("https://bo3.gg/matches/current"), "bo3.gg");
        assert_eq!(host_of("not a url"), "not a url");
    }

    #[tokio::test]
    async fn test_throttle_spaces_same_host() {
        let fetcher = Fetcher::with_client(reqwest::Client::new(), Duration::from_millis(150));
        let start = std::time::Instant::now();

        fetcher.wait_for("www.vlr.gg".to_string()).await;
        assert!(start.elapsed() < Duration::from_millis(100));

        fetcher.wait_for("www.vlr.gg".to_string()).await;
        assert!(start.elapsed() >= Duration::from_millis(120));

        fetcher.wait_for("www.vlr.gg".to_string()).await;
        assert!(start.elapsed() >= Duration::from_millis(270));
    }

    #[tokio::test]
    async fn test_throttle_hosts_are_independent() {
        let fetcher = Fetcher::with_client(reqwest::Client::new(), Duration::from_secs(2));
        let start = std::time::Instant::now();

        fetcher.wait_for("www.vlr.gg".to_string()).await;
        fetcher.wait_for("bo3.gg".to_string()).await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_zero_delay_disables_throttle() {
        let fetcher = Fetcher::with_client(reqwest::Client::new(), Duration::ZERO);
        assert!(fetcher.limiter.is_none());
        let start = std::time::Instant::now();
        for _ in 0..5 {
            fetcher.wait_for("www.vlr.gg".to_string()).await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_fetch_surfaces_transport_errors() {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let fetcher = Fetcher::with_client(http, Duration::ZERO);
        let err = fetcher
            .fetch("http://127.0.0.1:9/unreachable")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Network);
    }
}
