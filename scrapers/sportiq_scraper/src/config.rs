use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::analysis::SignalWeights;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_second: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_second: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapingConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl ScrapingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.playsport.cc".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts per page, the first one included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl RetryConfig {
    /// Delay before attempt `n + 1`, for `n` in `1..max_attempts`.
    pub fn backoff_for(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(1u64 << exp))
    }

    /// Every sleep a fully failing fetch goes through.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts.max(1))
            .map(|n| self.backoff_for(n))
            .collect()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub form_window: usize,
    pub weights: SignalWeights,
    pub team_aliases_file: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            form_window: 10,
            weights: SignalWeights::default(),
            team_aliases_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    pub response_deadline_secs: u64,
    pub max_analysis_results: usize,
    pub max_reply_chars: usize,
    pub source_utc_offset_hours: i32,
}

impl ServiceConfig {
    pub fn response_deadline(&self) -> Duration {
        Duration::from_secs(self.response_deadline_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            response_deadline_secs: 25,
            max_analysis_results: 3,
            max_reply_chars: 5000,
            source_utc_offset_hours: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebConfig {
    pub bind_addr: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScraperConfig {
    pub rate_limits: RateLimits,
    pub scraping: ScrapingConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub analysis: AnalysisConfig,
    pub service: ServiceConfig,
    pub web: WebConfig,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl ScraperConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = env::var("SCRAPER_BASE_URL") {
            config.scraping.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(user_agent) = env::var("SCRAPER_USER_AGENT") {
            config.scraping.user_agent = user_agent;
        }
        if let Some(timeout) = env_parse::<u64>("SCRAPER_TIMEOUT_SECS") {
            config.scraping.request_timeout_secs = timeout;
        }
        if let Some(rps) = env_parse::<u32>("RATE_LIMIT_RPS") {
            config.rate_limits.requests_per_second = rps;
        }
        if let Some(attempts) = env_parse::<u32>("RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts.max(1);
        }
        if let Some(backoff) = env_parse::<u64>("RETRY_INITIAL_BACKOFF_MS") {
            config.retry.initial_backoff_ms = backoff;
        }
        if let Some(ttl) = env_parse::<u64>("CACHE_TTL_SECS") {
            config.cache.ttl_secs = ttl;
        }
        if let Some(deadline) = env_parse::<u64>("RESPONSE_DEADLINE_SECS") {
            config.service.response_deadline_secs = deadline;
        }
        if let Some(window) = env_parse::<usize>("FORM_WINDOW") {
            config.analysis.form_window = window;
        }

        let weights = &mut config.analysis.weights;
        for (key, slot) in [
            ("WEIGHT_RECENT_FORM", &mut weights.recent_form),
            ("WEIGHT_HEAD_TO_HEAD", &mut weights.head_to_head),
            ("WEIGHT_HOME_AWAY", &mut weights.home_away_split),
            ("WEIGHT_MARKET", &mut weights.market),
            ("WEIGHT_SEASON_RECORD", &mut weights.season_record),
            ("WEIGHT_SCORING_MARGIN", &mut weights.scoring_margin),
        ] {
            if let Some(w) = env_parse::<f64>(key).filter(|w| w.is_finite() && *w >= 0.0) {
                *slot = w;
            }
        }

        if let Ok(path) = env::var("TEAM_ALIASES_FILE") {
            config.analysis.team_aliases_file = Some(PathBuf::from(path));
        }
        if let Some(max) = env_parse::<usize>("MAX_ANALYSIS_RESULTS") {
            config.service.max_analysis_results = max.max(1);
        }
        if let Some(max) = env_parse::<usize>("MAX_REPLY_CHARS") {
            config.service.max_reply_chars = max;
        }
        if let Some(offset) = env_parse::<i32>("SOURCE_UTC_OFFSET_HOURS") {
            config.service.source_utc_offset_hours = offset;
        }
        if let Ok(addr) = env::var("WEB_BIND_ADDR") {
            config.web.bind_addr = addr;
        }

        config
    }
}
