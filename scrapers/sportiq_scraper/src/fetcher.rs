use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::{
    config::{RetryConfig, ScraperConfig, ScrapingConfig},
    error::{FetchError, ScrapeError},
    leagues::{self, League},
    metrics::MetricsCollector,
    types::{LeaguePages, Sport},
};

/// The only seam between the scraper and the network.
#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: HtmlFetcher + ?Sized> HtmlFetcher for Arc<T> {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch_html(url).await
    }
}

pub struct WebHtmlFetcher {
    client: reqwest::Client,
}

impl WebHtmlFetcher {
    pub fn new(config: &ScrapingConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

#[async_trait]
impl HtmlFetcher for WebHtmlFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().await.map_err(transport_error)
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Fetches the two livescore boards of one league day, with rate limiting,
/// a per-attempt timeout and exponential backoff between attempts.
pub struct LeagueFetcher<F: HtmlFetcher> {
    html_fetcher: F,
    base_url: String,
    request_timeout: Duration,
    retry: RetryConfig,
    rate_limiter: Arc<DirectLimiter>,
    metrics: MetricsCollector,
}

impl<F: HtmlFetcher> LeagueFetcher<F> {
    pub fn new(html_fetcher: F, config: &ScraperConfig, metrics: MetricsCollector) -> Self {
        let rps = NonZeroU32::new(config.rate_limits.requests_per_second).unwrap_or_else(|| {
            warn!("RATE_LIMIT_RPS must be positive, falling back to 1");
            nonzero!(1u32)
        });

        Self {
            html_fetcher,
            base_url: config.scraping.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.scraping.request_timeout(),
            retry: config.retry.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            metrics,
        }
    }

    pub fn board_url(&self, league: &League, date: NaiveDate, preview: bool) -> String {
        let mut url = format!(
            "{}/livescore/{}?gamedate={}",
            self.base_url,
            league.source_id,
            date.format("%Y%m%d")
        );
        if preview {
            url.push_str("&mode=2");
        }
        url
    }

    /// Validates the pair before touching the network.
    pub async fn fetch(
        &self,
        sport: Sport,
        league: &str,
        date: NaiveDate,
    ) -> Result<LeaguePages, ScrapeError> {
        let league = leagues::resolve(sport, league).ok_or_else(|| ScrapeError::UnsupportedLeague {
            sport,
            league: league.to_string(),
        })?;
        self.fetch_league(league, date).await
    }

    pub async fn fetch_league(
        &self,
        league: &League,
        date: NaiveDate,
    ) -> Result<LeaguePages, ScrapeError> {
        let preview_url = self.board_url(league, date, true);
        let live_url = self.board_url(league, date, false);
        let (preview, live) = tokio::try_join!(
            self.fetch_page(&preview_url),
            self.fetch_page(&live_url)
        )?;
        Ok(LeaguePages { preview, live })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let wait_started = Instant::now();
            self.rate_limiter.until_ready().await;
            self.metrics.record_rate_limit_wait(wait_started.elapsed());

            let tracker = self.metrics.record_request_start();
            let result = match timeout(self.request_timeout, self.html_fetcher.fetch_html(url)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout),
            };
            tracker.finish(result.is_ok());

            let error = match result {
                Ok(body) => {
                    debug!("Fetched {} ({} bytes, attempt {})", url, body.len(), attempt);
                    return Ok(body);
                }
                Err(e) => e,
            };
            self.metrics.record_error(format!("{}: {}", url, error));

            if !error.is_retryable() {
                warn!("{} rejected: {}", url, error);
                return match error {
                    FetchError::Status(status) => Err(ScrapeError::UpstreamRejected { status }),
                    other => Err(ScrapeError::UpstreamUnavailable {
                        attempts: attempt,
                        last: other,
                    }),
                };
            }
            if attempt >= max_attempts {
                warn!("Giving up on {} after {} attempts: {}", url, attempt, error);
                return Err(ScrapeError::UpstreamUnavailable {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.retry.backoff_for(attempt);
            info!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt, max_attempts, url, error, delay
            );
            self.metrics.record_retry();
            sleep(delay).await;
            attempt += 1;
        }
    }
}
