use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::types::Sport;

/// A single failed attempt at the transport level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
}

impl FetchError {
    /// Timeouts, connection failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::Status(code) => *code >= 500 || *code == 429,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("upstream returned an empty document")]
    EmptyDocument,
    #[error("upstream served an error page: {0}")]
    UpstreamErrorPage(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("unsupported league {league} for {sport}")]
    UnsupportedLeague { sport: Sport, league: String },
    #[error("upstream rejected the request with HTTP {status}")]
    UpstreamRejected { status: u16 },
    #[error("upstream unavailable after {attempts} attempts: {last}")]
    UpstreamUnavailable { attempts: u32, last: FetchError },
    #[error("source temporarily unreadable: {0}")]
    Parse(#[from] ParseError),
    #[error("response deadline exceeded")]
    DeadlineExceeded,
}

/// Per-record failure; the record is dropped and the batch continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("missing {0} team name")]
    MissingTeam(&'static str),
    #[error("home and away are both {0}")]
    SameTeam(String),
    #[error("negative {side} score: {value}")]
    NegativeScore { side: &'static str, value: String },
    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// One league that contributed nothing to an aggregated response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeagueFailure {
    pub league: String,
    pub reason: String,
}

impl fmt::Display for LeagueFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.league, self.reason)
    }
}

/// What the router gets back when a command produces no reply blocks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("no league produced data ({} failures)", failures.len())]
    NoData { failures: Vec<LeagueFailure> },
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl ServiceError {
    /// Apology text the router shows instead of a listing.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::NoData { .. } => "目前無法取得賽事資料，請稍後再試。".to_string(),
            ServiceError::Scrape(ScrapeError::UnsupportedLeague { league, .. }) => {
                format!("不支援的聯賽：{}", league)
            }
            ServiceError::Scrape(ScrapeError::Parse(_)) => {
                "資料來源暫時無法讀取，請稍後再試。".to_string()
            }
            ServiceError::Scrape(_) => "資料來源暫時無法連線，請稍後再試。".to_string(),
            ServiceError::InvalidCommand(_) => {
                "無法辨識的指令，請輸入「籃球」或「分析 隊名」。".to_string()
            }
        }
    }
}
