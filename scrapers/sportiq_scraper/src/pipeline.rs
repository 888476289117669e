use anyhow::Result;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use crate::{
    analysis::{AnalysisReport, Analyzer},
    cache::{CacheKey, ResultCache},
    command::{Command, Intent},
    config::{ScraperConfig, ServiceConfig},
    error::{LeagueFailure, ScrapeError, ServiceError},
    fetcher::{HtmlFetcher, LeagueFetcher},
    leagues::{self, League},
    metrics::{MetricsCollector, ScraperMetrics},
    normalizer::{AliasTable, Normalizer},
    page_parser,
    report::{self, Reply},
    types::{MatchRecord, Sport},
};

/// Fixtures gathered for one request, plus the leagues that contributed nothing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Listing {
    pub records: Vec<MatchRecord>,
    pub failures: Vec<LeagueFailure>,
}

/// Live games first, then upcoming, then finished; earlier start times first.
pub fn sort_records(records: &mut [MatchRecord]) {
    records.sort_by_key(|r| (r.status.display_rank(), r.start_time.is_none(), r.start_time));
}

/// Case-insensitive substring match on either team name.
pub fn filter_by_team<'a>(records: &'a [MatchRecord], needle: &str) -> Vec<&'a MatchRecord> {
    records.iter().filter(|r| r.involves(needle)).collect()
}

/// Fetch → parse → normalize → cache, fanned out across leagues.
pub struct FixtureService<F: HtmlFetcher> {
    fetcher: LeagueFetcher<F>,
    normalizer: Normalizer,
    cache: ResultCache,
    analyzer: Analyzer,
    service: ServiceConfig,
    metrics: MetricsCollector,
}

impl<F: HtmlFetcher> FixtureService<F> {
    pub fn new(html_fetcher: F, config: &ScraperConfig) -> Result<Self> {
        let mut aliases = AliasTable::with_defaults();
        if let Some(path) = &config.analysis.team_aliases_file {
            let loaded = aliases.load_file(path)?;
            info!("Loaded {} team aliases from {}", loaded, path.display());
        }

        let metrics = MetricsCollector::new();
        Ok(Self {
            fetcher: LeagueFetcher::new(html_fetcher, config, metrics.clone()),
            normalizer: Normalizer::new(aliases, config.analysis.form_window),
            cache: ResultCache::new(config.cache.ttl(), metrics.clone()),
            analyzer: Analyzer::new(config.analysis.weights.clone()),
            service: config.service.clone(),
            metrics,
        })
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Request counters plus the current size of the result cache.
    pub fn stats(&self) -> ScraperMetrics {
        let mut stats = self.metrics.get_metrics();
        stats.cache_entries = self.cache.len();
        stats
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn service_config(&self) -> &ServiceConfig {
        &self.service
    }

    /// Normalized fixtures of one league day, served from the cache when fresh.
    pub async fn fixtures(
        &self,
        sport: Sport,
        league: &str,
        date: NaiveDate,
    ) -> Result<Arc<Vec<MatchRecord>>, ScrapeError> {
        let league = leagues::resolve(sport, league).ok_or_else(|| ScrapeError::UnsupportedLeague {
            sport,
            league: league.to_string(),
        })?;
        let key = CacheKey::new(sport, league.code, date);

        self.cache
            .get_or_fetch(&key, || async move {
                let pages = self.fetcher.fetch_league(league, date).await?;
                let raws = page_parser::parse(&pages, league.sport)?;
                let mut records = self.normalizer.normalize_all(&raws, league, date);
                sort_records(&mut records);
                info!("{} {}: {} fixtures", league.code, date, records.len());
                Ok::<_, ScrapeError>(records)
            })
            .await
    }

    /// Fetches every target concurrently under one shared deadline. A league
    /// that fails or runs out of time becomes a `LeagueFailure`.
    pub async fn collect(&self, targets: &[&'static League], date: NaiveDate) -> Listing {
        let deadline = Instant::now() + self.service.response_deadline();

        let lookups = targets.iter().map(|league| async move {
            let result = match timeout_at(deadline, self.fixtures(league.sport, league.code, date)).await {
                Ok(result) => result,
                Err(_) => Err(ScrapeError::DeadlineExceeded),
            };
            (*league, result)
        });

        let mut listing = Listing::default();
        for (league, result) in join_all(lookups).await {
            match result {
                Ok(records) => listing.records.extend(records.iter().cloned()),
                Err(e) => {
                    warn!("{} on {} failed: {}", league.code, date, e);
                    self.metrics.record_error(format!("{}: {}", league.code, e));
                    listing.failures.push(LeagueFailure {
                        league: league.code.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        sort_records(&mut listing.records);
        listing
    }

    /// Leagues a command covers.
    pub fn targets(&self, command: &Command) -> Result<Vec<&'static League>, ServiceError> {
        if let Some(code) = command.league.as_deref() {
            let league = match command.sport {
                Some(sport) => leagues::resolve(sport, code),
                None => leagues::find_league(code),
            };
            return league.map(|l| vec![l]).ok_or_else(|| {
                ServiceError::Scrape(ScrapeError::UnsupportedLeague {
                    sport: command.sport.unwrap_or(Sport::Basketball),
                    league: code.to_string(),
                })
            });
        }

        let sports: Vec<Sport> = match (command.sport, command.intent) {
            (Some(sport), _) => vec![sport],
            (None, Intent::List) => vec![Sport::Basketball],
            (None, Intent::Analyze) => Sport::ALL.to_vec(),
        };
        Ok(sports.into_iter().flat_map(leagues::leagues_for).collect())
    }

    /// The command's team filter, resolved through the alias table.
    fn team_filter(&self, command: &Command) -> Option<String> {
        let team = command.team_filter()?;
        self.normalizer
            .canonical_team(team)
            .or_else(|| Some(team.to_string()))
    }

    pub fn analyze_all(&self, records: &[MatchRecord]) -> Vec<AnalysisReport> {
        records
            .iter()
            .map(|record| self.analyzer.analyze(record, record))
            .collect()
    }

    /// Runs a router command end to end. Only a request where every league
    /// failed is an error; partial results carry notes about the gaps.
    pub async fn handle(&self, command: &Command) -> Result<Reply, ServiceError> {
        let targets = self.targets(command)?;
        let listing = self.collect(&targets, command.date).await;
        if listing.records.is_empty() && listing.failures.len() == targets.len() {
            return Err(ServiceError::NoData {
                failures: listing.failures,
            });
        }

        match command.intent {
            Intent::List => {
                let reports = match self.team_filter(command) {
                    Some(team) => filter_by_team(&listing.records, &team)
                        .into_iter()
                        .map(|record| self.analyzer.analyze(record, record))
                        .collect(),
                    None => self.analyze_all(&listing.records),
                };
                let sport = command.sport.or_else(|| {
                    let first = targets.first()?.sport;
                    targets.iter().all(|l| l.sport == first).then_some(first)
                });
                Ok(report::format_listing(
                    sport,
                    command.date,
                    &reports,
                    &listing.failures,
                ))
            }
            Intent::Analyze => {
                let selected: Vec<&MatchRecord> = match self.team_filter(command) {
                    Some(team) => filter_by_team(&listing.records, &team)
                        .into_iter()
                        .take(self.service.max_analysis_results)
                        .collect(),
                    None => listing.records.iter().take(1).collect(),
                };
                let reports: Vec<AnalysisReport> = selected
                    .into_iter()
                    .map(|record| self.analyzer.analyze(record, record))
                    .collect();

                let mut reply = report::format_analyses(&reports, &listing.failures);
                if reply.is_empty() {
                    let note = match command.team_filter() {
                        Some(team) => format!(
                            "❌ 找不到與「{}」相關的賽事。請確認隊名是否正確，或嘗試其他關鍵字。",
                            team
                        ),
                        None => "❌ 今日暫無賽事資料。".to_string(),
                    };
                    reply.notes.insert(0, note);
                }
                Ok(reply)
            }
        }
    }
}
