use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Basketball,
    Baseball,
    Hockey,
    Tennis,
    Soccer,
}

impl Sport {
    pub const ALL: [Sport; 5] = [
        Sport::Basketball,
        Sport::Baseball,
        Sport::Soccer,
        Sport::Hockey,
        Sport::Tennis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Basketball => "basketball",
            Sport::Baseball => "baseball",
            Sport::Hockey => "hockey",
            Sport::Tennis => "tennis",
            Sport::Soccer => "soccer",
        }
    }

    /// Points (runs, goals, games) that move the market roughly one logistic unit.
    pub fn spread_scale(&self) -> f64 {
        match self {
            Sport::Basketball => 6.0,
            Sport::Baseball => 1.5,
            Sport::Hockey => 1.0,
            Sport::Tennis => 3.0,
            Sport::Soccer => 1.0,
        }
    }

    /// Net scoring differential treated as a maximal edge.
    pub fn margin_scale(&self) -> f64 {
        match self {
            Sport::Basketball => 15.0,
            Sport::Baseball => 3.0,
            Sport::Hockey => 2.0,
            Sport::Tennis => 5.0,
            Sport::Soccer => 2.0,
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basketball" | "籃球" => Ok(Sport::Basketball),
            "baseball" | "棒球" => Ok(Sport::Baseball),
            "hockey" | "冰球" => Ok(Sport::Hockey),
            "tennis" | "網球" => Ok(Sport::Tennis),
            "soccer" | "football" | "足球" => Ok(Sport::Soccer),
            other => Err(format!("unknown sport: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
}

impl MatchStatus {
    /// Listing order: games in progress first, finished games last.
    pub fn display_rank(&self) -> u8 {
        match self {
            MatchStatus::Live => 0,
            MatchStatus::Scheduled => 1,
            MatchStatus::Finished => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn margin(&self) -> i64 {
        self.home as i64 - self.away as i64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Odds {
    /// Home handicap: positive means the home side is favoured by that many points.
    pub spread: Option<f64>,
    /// Decimal odds.
    pub spread_price: Option<f64>,
    /// Decimal odds.
    pub moneyline_home: Option<f64>,
    /// Decimal odds.
    pub moneyline_away: Option<f64>,
    pub total: Option<f64>,
}

impl Odds {
    pub fn is_empty(&self) -> bool {
        self.spread.is_none()
            && self.spread_price.is_none()
            && self.moneyline_home.is_none()
            && self.moneyline_away.is_none()
            && self.total.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FormResult {
    Win,
    Loss,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WinLoss {
    pub wins: u32,
    pub losses: u32,
}

impl WinLoss {
    pub fn new(wins: u32, losses: u32) -> Self {
        Self { wins, losses }
    }

    pub fn games(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<f64> {
        match self.games() {
            0 => None,
            games => Some(self.wins as f64 / games as f64),
        }
    }
}

impl fmt::Display for WinLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.wins, self.losses)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoringAverages {
    pub scored: f64,
    pub allowed: f64,
}

impl ScoringAverages {
    pub fn net(&self) -> f64 {
        self.scored - self.allowed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TeamStats {
    pub wins: u32,
    pub losses: u32,
    pub home_record: Option<WinLoss>,
    pub away_record: Option<WinLoss>,
    /// Most recent first.
    pub recent_form: Vec<FormResult>,
    pub scoring: Option<ScoringAverages>,
}

impl TeamStats {
    pub fn season(&self) -> WinLoss {
        WinLoss::new(self.wins, self.losses)
    }

    pub fn form_record(&self) -> WinLoss {
        let wins = self
            .recent_form
            .iter()
            .filter(|r| **r == FormResult::Win)
            .count() as u32;
        WinLoss::new(wins, self.recent_form.len() as u32 - wins)
    }
}

/// Historical meetings between the two sides of one fixture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeadToHead {
    pub home_wins: u32,
    pub away_wins: u32,
}

impl HeadToHead {
    pub fn meetings(&self) -> u32 {
        self.home_wins + self.away_wins
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodScore {
    pub home: u32,
    pub away: u32,
}

/// One fixture, normalized. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecord {
    pub id: String,
    pub sport: Sport,
    pub league: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub home_team: String,
    pub away_team: String,
    pub status: MatchStatus,
    pub score: Option<Score>,
    pub period_scores: Vec<PeriodScore>,
    pub odds: Option<Odds>,
    pub team_stats: BTreeMap<String, TeamStats>,
    pub head_to_head: Option<HeadToHead>,
}

impl MatchRecord {
    pub fn home_stats(&self) -> Option<&TeamStats> {
        self.team_stats.get(&self.home_team)
    }

    pub fn away_stats(&self) -> Option<&TeamStats> {
        self.team_stats.get(&self.away_team)
    }

    /// Case-insensitive substring match on either team name.
    pub fn involves(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.home_team.to_lowercase().contains(&needle)
            || self.away_team.to_lowercase().contains(&needle)
    }
}

/// Field strings pulled out of one fixture block; every entry may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawMatchFields {
    pub game_id: String,
    pub source_oid: Option<String>,
    pub away: Option<String>,
    pub home: Option<String>,
    pub start_time: Option<String>,
    pub away_record: Option<String>,
    pub home_record: Option<String>,
    pub away_recent: Option<String>,
    pub home_recent: Option<String>,
    pub away_h2h: Option<String>,
    pub home_h2h: Option<String>,
    pub away_avg: Option<String>,
    pub home_avg: Option<String>,
    /// Away team's record on the road.
    pub away_split: Option<String>,
    /// Home team's record at home.
    pub home_split: Option<String>,
    pub spread: Option<String>,
    pub spread_price: Option<String>,
    pub moneyline_home: Option<String>,
    pub moneyline_away: Option<String>,
    pub total: Option<String>,
    pub away_score: Option<String>,
    pub home_score: Option<String>,
    pub away_periods: Vec<String>,
    pub home_periods: Vec<String>,
    pub in_progress: bool,
}

/// The two upstream documents describing one league on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaguePages {
    /// Pre-game view: names, records, lines.
    pub preview: String,
    /// Live view: scores and status.
    pub live: String,
}
