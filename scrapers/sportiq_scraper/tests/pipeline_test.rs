use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use sportiq_scraper::{
    analysis::Verdict,
    command::Command,
    config::ScraperConfig,
    error::{FetchError, ScrapeError, ServiceError},
    fetcher::HtmlFetcher,
    pipeline::FixtureService,
    types::{FormResult, MatchStatus, Sport},
};

const NBA_PREVIEW: &str = include_str!("fixtures/nba_preview.html");
const NBA_LIVE: &str = include_str!("fixtures/nba_live.html");
const MAINTENANCE: &str = include_str!("fixtures/maintenance.html");
const EMPTY_BOARD: &str = include_str!("fixtures/empty_board.html");

/// Serves saved boards by league id: NBA has fixtures, the Euroleague is
/// under maintenance, KBL hangs, everything else is an off day.
struct SavedBoards {
    calls: AtomicUsize,
    delay: Duration,
    all_down: bool,
}

impl SavedBoards {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
            all_down: false,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HtmlFetcher for SavedBoards {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.all_down {
            return Ok(MAINTENANCE.to_string());
        }

        let preview = url.ends_with("&mode=2");
        let page = if url.contains("/livescore/3?") {
            if preview {
                NBA_PREVIEW
            } else {
                NBA_LIVE
            }
        } else if url.contains("/livescore/8?") {
            MAINTENANCE
        } else if url.contains("/livescore/92?") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            EMPTY_BOARD
        } else {
            EMPTY_BOARD
        };
        Ok(page.to_string())
    }
}

fn config() -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.rate_limits.requests_per_second = 1000;
    config.retry.initial_backoff_ms = 1;
    config.service.response_deadline_secs = 5;
    config
}

fn service(boards: Arc<SavedBoards>) -> FixtureService<Arc<SavedBoards>> {
    FixtureService::new(boards, &config()).unwrap()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

#[tokio::test]
async fn test_league_day_end_to_end() {
    let boards = Arc::new(SavedBoards::new());
    let service = service(boards.clone());

    let records = service.fixtures(Sport::Basketball, "nba", date()).await.unwrap();

    // Heat vs Heat is dropped; the rest come back live, upcoming, finished.
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "ps_3_20250301_104",
            "ps_3_20250301_102",
            "ps_3_20250301_105",
            "ps_3_20250301_101",
        ]
    );
    assert_eq!(boards.calls(), 2);

    let live = &records[0];
    assert_eq!(live.status, MatchStatus::Live);
    assert_eq!(live.score.map(|s| (s.home, s.away)), Some((48, 50)));
    assert_eq!(live.period_scores.len(), 2);

    let upcoming = &records[1];
    assert_eq!((upcoming.home_team.as_str(), upcoming.away_team.as_str()), ("Knicks", "Bulls"));
    assert_eq!(upcoming.status, MatchStatus::Scheduled);
    assert_eq!(upcoming.score, None);
    assert_eq!(upcoming.start_time.map(|t| t.to_string()), Some("09:00:00".to_string()));

    assert_eq!(records[2].home_team, "Warriors");
    assert_eq!(records[2].away_team, "國王");

    let finished = &records[3];
    assert_eq!((finished.home_team.as_str(), finished.away_team.as_str()), ("Lakers", "Celtics"));
    assert_eq!(finished.status, MatchStatus::Finished);
    assert_eq!(finished.score.map(|s| s.margin()), Some(12));
    assert_eq!(finished.period_scores.len(), 4);

    let odds = finished.odds.clone().unwrap();
    assert_eq!(odds.spread, Some(4.5));
    assert_eq!(odds.total, Some(228.5));
    assert!((odds.moneyline_away.unwrap() - 2.5).abs() < 1e-9);

    let lakers = finished.home_stats().unwrap();
    assert_eq!((lakers.wins, lakers.losses), (40, 12));
    assert_eq!(lakers.recent_form.len(), 10);
    assert_eq!(lakers.recent_form[..5], [FormResult::Win; 5]);
    assert_eq!(lakers.home_record.map(|r| r.to_string()), Some("20-5".to_string()));

    let celtics = finished.away_stats().unwrap();
    assert_eq!(celtics.away_record.map(|r| r.to_string()), Some("12-13".to_string()));
    assert_eq!(finished.head_to_head.map(|h| (h.home_wins, h.away_wins)), Some((2, 1)));
}

#[tokio::test]
async fn test_unsupported_league_never_fetches() {
    let boards = Arc::new(SavedBoards::new());
    let service = service(boards.clone());

    let err = service.fixtures(Sport::Basketball, "XYZ", date()).await.unwrap_err();
    assert_eq!(
        err,
        ScrapeError::UnsupportedLeague {
            sport: Sport::Basketball,
            league: "XYZ".to_string()
        }
    );

    let command = Command::list(Some(Sport::Baseball), date()).with_league(Some("NBA".into()));
    assert!(matches!(
        service.handle(&command).await,
        Err(ServiceError::Scrape(ScrapeError::UnsupportedLeague { .. }))
    ));
    assert_eq!(boards.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let boards = Arc::new(SavedBoards {
        delay: Duration::from_millis(50),
        ..SavedBoards::new()
    });
    let service = service(boards.clone());

    let lookups = (0..8).map(|_| service.fixtures(Sport::Basketball, "NBA", date()));
    let results = join_all(lookups).await;

    assert!(results.iter().all(|r| r.as_ref().map(|v| v.len()) == Ok(4)));
    assert_eq!(boards.calls(), 2);
    let metrics = service.metrics().get_metrics();
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.cache_hits, 7);
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_keeps_the_rest() {
    let boards = Arc::new(SavedBoards::new());
    let service = service(boards);

    let reply = service
        .handle(&Command::list(Some(Sport::Basketball), date()))
        .await
        .unwrap();

    assert_eq!(reply.blocks.len(), 4);
    assert!(reply.header.contains("共 4 場"));
    assert!(reply.blocks[0].starts_with("🏷 NBA【4 場】"));
    assert!(reply.notes.iter().any(|n| n.contains("歐洲職籃")));
    assert!(reply.notes.iter().any(|n| n.contains("韓國職籃")));
    assert!(!reply.notes.iter().any(|n| n.contains("SBL")));
}

#[tokio::test]
async fn test_every_league_failing_is_no_data() {
    let boards = Arc::new(SavedBoards {
        all_down: true,
        ..SavedBoards::new()
    });
    let service = service(boards);

    let err = service
        .handle(&Command::list(Some(Sport::Basketball), date()))
        .await
        .unwrap_err();
    match &err {
        ServiceError::NoData { failures } => {
            assert_eq!(failures.len(), 5);
            assert!(failures.iter().all(|f| f.reason.contains("系統維護")));
        }
        other => panic!("expected NoData, got {:?}", other),
    }
    assert!(err.user_message().contains("稍後再試"));
}

#[tokio::test]
async fn test_maintenance_page_is_a_league_failure() {
    let boards = Arc::new(SavedBoards::new());
    let service = service(boards.clone());

    let err = service
        .fixtures(Sport::Basketball, "EUROLEAGUE", date())
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::Parse(_)));
    assert_eq!(boards.calls(), 2);

    // Failures are not cached, so the next call goes back upstream.
    let listing = service
        .collect(&[sportiq_scraper::leagues::find_league("EUROLEAGUE").unwrap()], date())
        .await;
    assert!(listing.records.is_empty());
    assert_eq!(listing.failures[0].league, "EUROLEAGUE");
    assert_eq!(boards.calls(), 4);
}

#[tokio::test]
async fn test_analysis_by_team_alias() {
    let boards = Arc::new(SavedBoards::new());
    let service = service(boards);

    let command = Command::analyze(Some("湖人".into()), date())
        .with_sport(Some(Sport::Basketball))
        .with_league(Some("NBA".into()));
    let reply = service.handle(&command).await.unwrap();

    assert_eq!(reply.blocks.len(), 1);
    let block = &reply.blocks[0];
    assert!(block.contains("🏠 Lakers"));
    assert!(block.contains("Lakers 主勝"));
    assert!(block.contains("📐 預估總分"));

    let records = service.fixtures(Sport::Basketball, "NBA", date()).await.unwrap();
    let lakers_game = records.iter().find(|r| r.home_team == "Lakers").unwrap();
    let report = service.analyzer().analyze(lakers_game, lakers_game);
    assert_eq!(report.predicted_winner, Verdict::Home);
}

#[tokio::test]
async fn test_unknown_team_gets_not_found_note() {
    let boards = Arc::new(SavedBoards::new());
    let service = service(boards);

    let command = Command::analyze(Some("Grizzlies".into()), date()).with_league(Some("NBA".into()));
    let reply = service.handle(&command).await.unwrap();
    assert!(reply.is_empty());
    assert!(reply.render(5000).contains("找不到與「Grizzlies」相關的賽事"));
}
