use chrono::{Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::Sport;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    List,
    Analyze,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateOffset {
    Yesterday,
    #[default]
    Today,
    Tomorrow,
}

impl DateOffset {
    pub fn days(&self) -> i64 {
        match self {
            DateOffset::Yesterday => -1,
            DateOffset::Today => 0,
            DateOffset::Tomorrow => 1,
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        today + Duration::days(self.days())
    }
}

impl FromStr for DateOffset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yesterday" | "昨天" | "昨日" => Ok(DateOffset::Yesterday),
            "" | "today" | "今天" | "今日" => Ok(DateOffset::Today),
            "tomorrow" | "明天" | "明日" => Ok(DateOffset::Tomorrow),
            other => Err(format!("unknown day: {}", other)),
        }
    }
}

/// Calendar date at the upstream site right now.
pub fn source_today(utc_offset_hours: i32) -> NaiveDate {
    let offset = FixedOffset::east_opt(utc_offset_hours.clamp(-23, 23) * 3600)
        .unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset).date_naive()
}

/// What the chat router hands over after interpreting the user's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Command {
    pub intent: Intent,
    pub sport: Option<Sport>,
    pub league: Option<String>,
    pub date: NaiveDate,
    pub team_filter: Option<String>,
}

impl Command {
    pub fn list(sport: Option<Sport>, date: NaiveDate) -> Self {
        Self {
            intent: Intent::List,
            sport,
            league: None,
            date,
            team_filter: None,
        }
    }

    pub fn analyze(team_filter: Option<String>, date: NaiveDate) -> Self {
        Self {
            intent: Intent::Analyze,
            sport: None,
            league: None,
            date,
            team_filter,
        }
    }

    pub fn with_sport(mut self, sport: Option<Sport>) -> Self {
        self.sport = sport;
        self
    }

    pub fn with_league(mut self, league: Option<String>) -> Self {
        self.league = league.filter(|l| !l.trim().is_empty());
        self
    }

    /// Blank filters mean "no filter".
    pub fn team_filter(&self) -> Option<&str> {
        self.team_filter
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
