//! Rule-based pre-game analysis.
//!
//! Every signal maps one aspect of a fixture to a value in `[-1, 1]`
//! (positive favours the home side). Values are scaled by a weight table and
//! summed, then divided by the total weight; the sign of the result picks the
//! side and its magnitude the confidence.
//! The engine is a pure function of its inputs.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use crate::types::{MatchRecord, MatchStatus, TeamStats};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    RecentForm,
    HeadToHead,
    HomeAwaySplit,
    Market,
    SeasonRecord,
    ScoringMargin,
}

impl Signal {
    pub const ALL: [Signal; 6] = [
        Signal::RecentForm,
        Signal::HeadToHead,
        Signal::HomeAwaySplit,
        Signal::Market,
        Signal::SeasonRecord,
        Signal::ScoringMargin,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Signal::RecentForm => "近期狀態",
            Signal::HeadToHead => "歷史交鋒",
            Signal::HomeAwaySplit => "主客場",
            Signal::Market => "盤口",
            Signal::SeasonRecord => "整體戰績",
            Signal::ScoringMargin => "攻防數據",
        }
    }
}

/// Weight per signal. Only relative sizes matter: the weighted sum is divided
/// by the total before it is clipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalWeights {
    pub recent_form: f64,
    pub head_to_head: f64,
    pub home_away_split: f64,
    pub market: f64,
    pub season_record: f64,
    pub scoring_margin: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            recent_form: 0.25,
            head_to_head: 0.10,
            home_away_split: 0.20,
            market: 0.30,
            season_record: 0.10,
            scoring_margin: 0.05,
        }
    }
}

impl SignalWeights {
    pub fn weight(&self, signal: Signal) -> f64 {
        match signal {
            Signal::RecentForm => self.recent_form,
            Signal::HeadToHead => self.head_to_head,
            Signal::HomeAwaySplit => self.home_away_split,
            Signal::Market => self.market,
            Signal::SeasonRecord => self.season_record,
            Signal::ScoringMargin => self.scoring_margin,
        }
    }

    pub fn total(&self) -> f64 {
        Signal::ALL.iter().map(|s| self.weight(*s).max(0.0)).sum()
    }
}

/// Where the engine gets per-team statistics from.
pub trait TeamStatsLookup {
    fn stats_for(&self, team: &str) -> Option<&TeamStats>;
}

impl TeamStatsLookup for MatchRecord {
    fn stats_for(&self, team: &str) -> Option<&TeamStats> {
        self.team_stats.get(team)
    }
}

impl TeamStatsLookup for BTreeMap<String, TeamStats> {
    fn stats_for(&self, team: &str) -> Option<&TeamStats> {
        self.get(team)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Home,
    Away,
    TossUp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.45 {
            ConfidenceLevel::High
        } else if confidence >= 0.2 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "低",
            ConfidenceLevel::Medium => "中",
            ConfidenceLevel::High => "高",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyFactor {
    pub signal: Signal,
    /// Unweighted value in `[-1, 1]`.
    pub value: f64,
    pub contribution: f64,
    pub favours: Option<Side>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub predicted_winner: Verdict,
    pub confidence: f64,
    pub level: ConfidenceLevel,
    /// Weighted sum over the total weight, in `[-1, 1]`; positive favours the
    /// home side.
    pub score: f64,
    pub key_factors: Vec<KeyFactor>,
    pub projected_total: Option<f64>,
    pub generated_from: MatchRecord,
}

impl AnalysisReport {
    /// Lean towards the home side in `[0, 1]`, 0.5 being a toss-up.
    pub fn home_lean(&self) -> f64 {
        (self.score + 1.0) / 2.0
    }
}

/// How a finished game settled against its posted handicap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpreadOutcome {
    Covered,
    NotCovered,
    Push,
}

/// Whether the side the line favoured beat the line. Only finished games with a line.
pub fn spread_outcome(record: &MatchRecord) -> Option<SpreadOutcome> {
    if record.status != MatchStatus::Finished {
        return None;
    }
    let score = record.score?;
    let spread = record.odds.as_ref()?.spread?;
    // Margin of the favoured side minus the handicap it gave.
    let favoured_margin = if spread > 0.0 {
        score.margin() as f64
    } else {
        -(score.margin() as f64)
    };
    let edge = favoured_margin - spread.abs();
    Some(if edge.abs() < EPSILON {
        SpreadOutcome::Push
    } else if edge > 0.0 {
        SpreadOutcome::Covered
    } else {
        SpreadOutcome::NotCovered
    })
}

struct Evidence {
    value: f64,
    text: String,
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    weights: SignalWeights,
}

impl Analyzer {
    pub fn new(weights: SignalWeights) -> Self {
        Self { weights }
    }

    pub fn analyze(&self, record: &MatchRecord, lookup: &dyn TeamStatsLookup) -> AnalysisReport {
        let home = lookup.stats_for(&record.home_team);
        let away = lookup.stats_for(&record.away_team);

        let mut key_factors: Vec<KeyFactor> = Signal::ALL
            .iter()
            .filter_map(|signal| {
                let evidence = evaluate(*signal, record, home, away)?;
                let value = evidence.value.clamp(-1.0, 1.0);
                let contribution = value * self.weights.weight(*signal).max(0.0);
                Some(KeyFactor {
                    signal: *signal,
                    value,
                    contribution,
                    favours: side_of(value),
                    text: evidence.text,
                })
            })
            .collect();

        // Stable sort keeps signal order among equal contributions.
        key_factors.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

        // Normalized by the total weight before clipping, so scaling every
        // weight by the same factor leaves the report unchanged.
        let raw: f64 = key_factors.iter().map(|f| f.contribution).sum();
        let total_weight = self.weights.total();
        let score = if raw.abs() < EPSILON || total_weight <= EPSILON {
            0.0
        } else {
            (raw / total_weight).clamp(-1.0, 1.0)
        };
        let predicted_winner = match side_of(score) {
            Some(Side::Home) => Verdict::Home,
            Some(Side::Away) => Verdict::Away,
            None => Verdict::TossUp,
        };
        let confidence = score.abs();

        AnalysisReport {
            predicted_winner,
            confidence,
            level: ConfidenceLevel::from_confidence(confidence),
            score,
            key_factors,
            projected_total: projected_total(home, away),
            generated_from: record.clone(),
        }
    }
}

/// Analyzes with the default weight table.
pub fn analyze(record: &MatchRecord, lookup: &dyn TeamStatsLookup) -> AnalysisReport {
    Analyzer::default().analyze(record, lookup)
}

fn side_of(value: f64) -> Option<Side> {
    if value > EPSILON {
        Some(Side::Home)
    } else if value < -EPSILON {
        Some(Side::Away)
    } else {
        None
    }
}

fn pct(rate: f64) -> String {
    format!("{:.0}%", rate * 100.0)
}

fn evaluate(
    signal: Signal,
    record: &MatchRecord,
    home: Option<&TeamStats>,
    away: Option<&TeamStats>,
) -> Option<Evidence> {
    let (home_name, away_name) = (&record.home_team, &record.away_team);
    match signal {
        Signal::RecentForm => {
            let (h, a) = (home?.form_record(), away?.form_record());
            let value = h.win_rate()? - a.win_rate()?;
            Some(Evidence {
                value,
                text: format!(
                    "{}（主）近{}場 {}勝{}敗 vs {}（客）近{}場 {}勝{}敗",
                    home_name,
                    h.games(),
                    h.wins,
                    h.losses,
                    away_name,
                    a.games(),
                    a.wins,
                    a.losses
                ),
            })
        }
        Signal::HeadToHead => {
            let h2h = record.head_to_head.filter(|h| h.meetings() > 0)?;
            let value = (h2h.home_wins as f64 - h2h.away_wins as f64) / h2h.meetings() as f64;
            Some(Evidence {
                value,
                text: format!(
                    "交手 {} 場：{} {}勝，{} {}勝",
                    h2h.meetings(),
                    home_name,
                    h2h.home_wins,
                    away_name,
                    h2h.away_wins
                ),
            })
        }
        Signal::HomeAwaySplit => {
            let h = home?.home_record?;
            let a = away?.away_record?;
            let (h_rate, a_rate) = (h.win_rate()?, a.win_rate()?);
            Some(Evidence {
                value: h_rate - a_rate,
                text: format!(
                    "{} 主場 {}（{}）vs {} 客場 {}（{}）",
                    home_name,
                    h,
                    pct(h_rate),
                    away_name,
                    a,
                    pct(a_rate)
                ),
            })
        }
        Signal::Market => {
            let odds = record.odds.as_ref()?;
            let (p_home, basis) = match (odds.moneyline_home, odds.moneyline_away) {
                (Some(mh), Some(ma)) if mh > 1.0 && ma > 1.0 => {
                    let (ih, ia) = (1.0 / mh, 1.0 / ma);
                    (ih / (ih + ia), format!("獨贏 {:.2} / {:.2}", mh, ma))
                }
                _ => {
                    let spread = odds.spread?;
                    let p = 1.0 / (1.0 + (-spread / record.sport.spread_scale()).exp());
                    let favourite = if spread > 0.0 { home_name } else { away_name };
                    (p, format!("{} 讓 {}", favourite, spread.abs()))
                }
            };
            Some(Evidence {
                value: 2.0 * p_home - 1.0,
                text: format!("{}，主隊隱含勝率 {}", basis, pct(p_home)),
            })
        }
        Signal::SeasonRecord => {
            let (h, a) = (home?.season(), away?.season());
            let (h_rate, a_rate) = (h.win_rate()?, a.win_rate()?);
            Some(Evidence {
                value: h_rate - a_rate,
                text: format!(
                    "{} {}勝{}敗（{}）vs {} {}勝{}敗（{}）",
                    home_name,
                    h.wins,
                    h.losses,
                    pct(h_rate),
                    away_name,
                    a.wins,
                    a.losses,
                    pct(a_rate)
                ),
            })
        }
        Signal::ScoringMargin => {
            let (h, a) = (home?.scoring?, away?.scoring?);
            let value = (h.net() - a.net()) / record.sport.margin_scale();
            Some(Evidence {
                value,
                text: format!(
                    "{} 場均淨勝 {:+.1} vs {} {:+.1}",
                    home_name,
                    h.net(),
                    away_name,
                    a.net()
                ),
            })
        }
    }
}

/// Mean of both teams' points for and against, when both averages are known.
fn projected_total(home: Option<&TeamStats>, away: Option<&TeamStats>) -> Option<f64> {
    let (h, a) = (home?.scoring?, away?.scoring?);
    Some((h.scored + h.allowed + a.scored + a.allowed) / 2.0)
}
