use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};
use tracing::{debug, warn};

use crate::{
    error::NormalizationError,
    leagues::League,
    types::{
        FormResult, HeadToHead, MatchRecord, MatchStatus, Odds, PeriodScore, RawMatchFields,
        Score, TeamStats, WinLoss,
    },
    utils::{
        fold_team_name, parse_averages, parse_count, parse_decimal, parse_price, parse_record,
        parse_spread, parse_start_time, ParsedRecord,
    },
};

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("la lakers", "Lakers"),
    ("los angeles lakers", "Lakers"),
    ("湖人", "Lakers"),
    ("boston celtics", "Celtics"),
    ("塞爾提克", "Celtics"),
    ("golden state warriors", "Warriors"),
    ("勇士", "Warriors"),
    ("ny yankees", "Yankees"),
    ("new york yankees", "Yankees"),
    ("洋基", "Yankees"),
];

/// Case-folded alias → canonical team name.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    pub fn with_defaults() -> Self {
        let mut table = Self::default();
        for (alias, canonical) in DEFAULT_ALIASES {
            table.insert(alias, canonical);
        }
        table
    }

    pub fn insert(&mut self, alias: &str, canonical: &str) {
        if let (Some(alias), Some(canonical)) = (fold_team_name(alias), fold_team_name(canonical)) {
            self.aliases.insert(alias.to_lowercase(), canonical);
        }
    }

    /// Merges a JSON object of `{ "alias": "canonical" }` pairs.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read alias file {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid alias file {}", path.display()))?;
        for (alias, canonical) in &entries {
            self.insert(alias, canonical);
        }
        Ok(entries.len())
    }

    pub fn canonicalize(&self, raw: &str) -> Option<String> {
        let folded = fold_team_name(raw)?;
        Some(
            self.aliases
                .get(&folded.to_lowercase())
                .cloned()
                .unwrap_or(folded),
        )
    }
}

/// Turns parser output into validated `MatchRecord`s.
#[derive(Debug, Clone)]
pub struct Normalizer {
    aliases: AliasTable,
    form_window: usize,
}

impl Normalizer {
    pub fn new(aliases: AliasTable, form_window: usize) -> Self {
        Self {
            aliases,
            form_window,
        }
    }

    /// Canonical spelling of a user-typed team name, used for team filters.
    pub fn canonical_team(&self, name: &str) -> Option<String> {
        self.aliases.canonicalize(name)
    }

    pub fn normalize(
        &self,
        raw: &RawMatchFields,
        league: &League,
        date: NaiveDate,
    ) -> Result<MatchRecord, NormalizationError> {
        let home_team = raw
            .home
            .as_deref()
            .and_then(|name| self.aliases.canonicalize(name))
            .ok_or(NormalizationError::MissingTeam("home"))?;
        let away_team = raw
            .away
            .as_deref()
            .and_then(|name| self.aliases.canonicalize(name))
            .ok_or(NormalizationError::MissingTeam("away"))?;
        if home_team.to_lowercase() == away_team.to_lowercase() {
            return Err(NormalizationError::SameTeam(home_team));
        }

        let home_score = score_field(raw.home_score.as_deref(), "home")?;
        let away_score = score_field(raw.away_score.as_deref(), "away")?;
        let (status, score) = match (home_score, away_score) {
            (Some(home), Some(away)) => {
                let status = if raw.in_progress {
                    MatchStatus::Live
                } else {
                    MatchStatus::Finished
                };
                (status, Some(Score { home, away }))
            }
            _ => (MatchStatus::Scheduled, None),
        };

        let period_scores = if score.is_some() {
            raw.home_periods
                .iter()
                .zip(raw.away_periods.iter())
                .map(|(home, away)| {
                    Ok(PeriodScore {
                        home: score_field(Some(home.as_str()), "home")?.unwrap_or(0),
                        away: score_field(Some(away.as_str()), "away")?.unwrap_or(0),
                    })
                })
                .collect::<Result<Vec<_>, NormalizationError>>()?
        } else {
            Vec::new()
        };

        let mut team_stats = BTreeMap::new();
        if let Some(stats) = self.team_stats(
            raw.home_record.as_deref(),
            raw.home_recent.as_deref(),
            raw.home_split.as_deref(),
            raw.home_avg.as_deref(),
            true,
        ) {
            team_stats.insert(home_team.clone(), stats);
        }
        if let Some(stats) = self.team_stats(
            raw.away_record.as_deref(),
            raw.away_recent.as_deref(),
            raw.away_split.as_deref(),
            raw.away_avg.as_deref(),
            false,
        ) {
            team_stats.insert(away_team.clone(), stats);
        }

        Ok(MatchRecord {
            id: format!(
                "ps_{}_{}_{}",
                league.source_id,
                date.format("%Y%m%d"),
                raw.game_id
            ),
            sport: league.sport,
            league: league.code.to_string(),
            date,
            start_time: raw.start_time.as_deref().and_then(parse_start_time),
            home_team,
            away_team,
            status,
            score,
            period_scores,
            odds: odds(raw)?,
            team_stats,
            head_to_head: head_to_head(raw.home_h2h.as_deref(), raw.away_h2h.as_deref()),
        })
    }

    /// Normalizes a page worth of fixtures, dropping (and logging) the ones that fail.
    pub fn normalize_all(
        &self,
        raws: &[RawMatchFields],
        league: &League,
        date: NaiveDate,
    ) -> Vec<MatchRecord> {
        let records: Vec<MatchRecord> = raws
            .iter()
            .filter_map(|raw| match self.normalize(raw, league, date) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        "Dropping {} fixture {} on {}: {}",
                        league.code, raw.game_id, date, e
                    );
                    None
                }
            })
            .collect();
        debug!(
            "{} on {}: kept {} of {} fixtures",
            league.code,
            date,
            records.len(),
            raws.len()
        );
        records
    }

    fn team_stats(
        &self,
        season: Option<&str>,
        recent: Option<&str>,
        split: Option<&str>,
        averages: Option<&str>,
        is_home: bool,
    ) -> Option<TeamStats> {
        let season = season.and_then(parse_record);
        let recent = recent.and_then(parse_record);
        let split = split
            .and_then(parse_record)
            .map(|r| WinLoss::new(r.wins, r.losses));
        let scoring = averages.and_then(parse_averages);
        if season.is_none() && recent.is_none() && split.is_none() && scoring.is_none() {
            return None;
        }

        let (home_record, away_record) = if is_home { (split, None) } else { (None, split) };
        Some(TeamStats {
            wins: season.map_or(0, |r| r.wins),
            losses: season.map_or(0, |r| r.losses),
            home_record,
            away_record,
            recent_form: recent
                .map(|r| expand_form(&r, self.form_window))
                .unwrap_or_default(),
            scoring,
        })
    }
}

fn score_field(raw: Option<&str>, side: &'static str) -> Result<Option<u32>, NormalizationError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match parse_count(raw) {
        Some(value) if value < 0 => Err(NormalizationError::NegativeScore {
            side,
            value: raw.to_string(),
        }),
        Some(value) => u32::try_from(value)
            .map(Some)
            .map_err(|_| NormalizationError::InvalidNumber {
                field: "score",
                value: raw.to_string(),
            }),
        // Placeholders like "-" before tip-off
        None => Ok(None),
    }
}

fn odds(raw: &RawMatchFields) -> Result<Option<Odds>, NormalizationError> {
    fn price(field: &'static str, value: Option<&str>) -> Result<Option<f64>, NormalizationError> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(v) => parse_price(v)
                .map(Some)
                .ok_or_else(|| NormalizationError::InvalidNumber {
                    field,
                    value: v.to_string(),
                }),
        }
    }

    let odds = Odds {
        spread: raw.spread.as_deref().and_then(parse_spread),
        spread_price: price("spread price", raw.spread_price.as_deref())?,
        moneyline_home: price("home moneyline", raw.moneyline_home.as_deref())?,
        moneyline_away: price("away moneyline", raw.moneyline_away.as_deref())?,
        total: raw
            .total
            .as_deref()
            .and_then(parse_decimal)
            .filter(|t| *t > 0.0),
    };
    Ok((!odds.is_empty()).then_some(odds))
}

/// Both sides print their own view of the series; the home side's wins are
/// the away side's losses, so either cell is enough.
fn head_to_head(home: Option<&str>, away: Option<&str>) -> Option<HeadToHead> {
    let h2h = match (home.and_then(parse_record), away.and_then(parse_record)) {
        (Some(h), Some(a)) => HeadToHead {
            home_wins: h.wins,
            away_wins: a.wins,
        },
        (Some(h), None) => HeadToHead {
            home_wins: h.wins,
            away_wins: h.losses,
        },
        (None, Some(a)) => HeadToHead {
            home_wins: a.losses,
            away_wins: a.wins,
        },
        (None, None) => return None,
    };
    (h2h.meetings() > 0).then_some(h2h)
}

/// Rebuilds a most-recent-first sequence from a W-L count and optional streak.
///
/// The streak comes first, then the single opposite result that ended the
/// previous run, then the remaining wins before the remaining losses.
pub fn expand_form(record: &ParsedRecord, window: usize) -> Vec<FormResult> {
    let mut wins = record.wins as usize;
    let mut losses = record.losses as usize;
    let mut form = Vec::with_capacity(wins + losses);

    if let Some((result, len)) = record.streak {
        let (same, other) = match result {
            FormResult::Win => (&mut wins, &mut losses),
            FormResult::Loss => (&mut losses, &mut wins),
        };
        let run = (len as usize).min(*same);
        form.extend(std::iter::repeat(result).take(run));
        *same -= run;
        if *other > 0 {
            let opposite = match result {
                FormResult::Win => FormResult::Loss,
                FormResult::Loss => FormResult::Win,
            };
            form.push(opposite);
            *other -= 1;
        }
    }
    form.extend(std::iter::repeat(FormResult::Win).take(wins));
    form.extend(std::iter::repeat(FormResult::Loss).take(losses));
    form.truncate(window);
    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leagues::find_league;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn nba() -> &'static League {
        find_league("NBA").unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn raw(home: &str, away: &str) -> RawMatchFields {
        RawMatchFields {
            game_id: "101".into(),
            home: Some(home.into()),
            away: Some(away.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_scheduled_fixture() {
        let normalizer = Normalizer::new(AliasTable::with_defaults(), 10);
        let mut fields = raw("Los Angeles  Lakers", "Boston Celtics");
        fields.start_time = Some("08:30".into());
        fields.spread = Some("+4.5".into());
        fields.home_recent = Some("8 - 2 , 5連勝".into());

        let record = normalizer.normalize(&fields, nba(), date()).unwrap();
        assert_eq!(record.id, "ps_3_20250301_101");
        assert_eq!(record.home_team, "Lakers");
        assert_eq!(record.away_team, "Celtics");
        assert_eq!(record.status, MatchStatus::Scheduled);
        assert_eq!(record.score, None);
        assert_eq!(record.odds.unwrap().spread, Some(4.5));
        assert_eq!(record.home_stats().unwrap().form_record(), WinLoss::new(8, 2));
        assert!(record.away_stats().is_none());
    }

    #[test]
    fn test_status_from_scores() {
        let normalizer = Normalizer::new(AliasTable::default(), 10);
        let mut fields = raw("Heat", "Magic");
        fields.home_score = Some("101".into());
        fields.away_score = Some("99".into());
        let finished = normalizer.normalize(&fields, nba(), date()).unwrap();
        assert_eq!(finished.status, MatchStatus::Finished);
        assert_eq!(finished.score, Some(Score { home: 101, away: 99 }));

        fields.in_progress = true;
        let live = normalizer.normalize(&fields, nba(), date()).unwrap();
        assert_eq!(live.status, MatchStatus::Live);

        fields.home_score = None;
        let one_sided = normalizer.normalize(&fields, nba(), date()).unwrap();
        assert_eq!(one_sided.status, MatchStatus::Scheduled);
        assert_eq!(one_sided.score, None);
    }

    #[test]
    fn test_invariant_violations() {
        let normalizer = Normalizer::new(AliasTable::with_defaults(), 10);
        assert_eq!(
            normalizer.normalize(&raw("湖人", "LA Lakers"), nba(), date()),
            Err(NormalizationError::SameTeam("Lakers".into()))
        );
        assert_eq!(
            normalizer.normalize(&raw("—", "Heat"), nba(), date()),
            Err(NormalizationError::MissingTeam("home"))
        );

        let mut negative = raw("Heat", "Magic");
        negative.home_score = Some("-3".into());
        negative.away_score = Some("10".into());
        assert!(matches!(
            normalizer.normalize(&negative, nba(), date()),
            Err(NormalizationError::NegativeScore { side: "home", .. })
        ));
    }

    #[test]
    fn test_normalize_all_keeps_good_records() {
        let normalizer = Normalizer::new(AliasTable::default(), 10);
        let raws = vec![raw("Heat", "Magic"), raw("Nets", "Nets"), raw("Bulls", "Hawks")];
        let records = normalizer.normalize_all(&raws, nba(), date());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_odds_notations() {
        let normalizer = Normalizer::new(AliasTable::default(), 10);
        let mut fields = raw("Heat", "Magic");
        fields.spread = Some("0".into());
        fields.moneyline_home = Some("-150".into());
        fields.moneyline_away = Some("+130".into());
        fields.total = Some("221.5".into());
        let odds = normalizer.normalize(&fields, nba(), date()).unwrap().odds.unwrap();
        assert_eq!(odds.spread, None);
        assert!((odds.moneyline_home.unwrap() - 1.6667).abs() < 1e-3);
        assert!((odds.moneyline_away.unwrap() - 2.3).abs() < 1e-9);
        assert_eq!(odds.total, Some(221.5));

        fields.moneyline_home = Some("1,85".into());
        assert!(matches!(
            normalizer.normalize(&fields, nba(), date()),
            Err(NormalizationError::InvalidNumber { .. })
        ));

        fields.moneyline_home = Some("abc".into());
        assert!(matches!(
            normalizer.normalize(&fields, nba(), date()),
            Err(NormalizationError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_expand_form() {
        let record = parse_record("7 - 3 , 2連敗").unwrap();
        use FormResult::{Loss as L, Win as W};
        assert_eq!(expand_form(&record, 10), vec![L, L, W, W, W, W, W, W, W, L]);
        assert_eq!(expand_form(&record, 4), vec![L, L, W, W]);

        let record = parse_record("20 - 5").unwrap();
        assert_eq!(expand_form(&record, 10).len(), 10);
    }

    #[test]
    fn test_head_to_head_from_either_side() {
        assert_eq!(
            head_to_head(Some("3 - 1"), None),
            Some(HeadToHead { home_wins: 3, away_wins: 1 })
        );
        assert_eq!(
            head_to_head(None, Some("1 - 3")),
            Some(HeadToHead { home_wins: 3, away_wins: 1 })
        );
        assert_eq!(head_to_head(Some("0 - 0"), None), None);
    }

    #[test]
    fn test_alias_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"快艇": "Clippers", "LA Clippers": "Clippers"}}"#).unwrap();

        let mut table = AliasTable::default();
        assert_eq!(table.load_file(file.path()).unwrap(), 2);
        assert_eq!(table.canonicalize(" la  clippers "), Some("Clippers".into()));
        assert_eq!(table.canonicalize("快艇"), Some("Clippers".into()));
        assert_eq!(table.canonicalize("Suns"), Some("Suns".into()));
    }
}
