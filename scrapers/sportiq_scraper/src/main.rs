use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::{fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sportiq_scraper::{
    command::{source_today, Command, DateOffset},
    config::ScraperConfig,
    fetcher::WebHtmlFetcher,
    leagues,
    normalizer::{AliasTable, Normalizer},
    page_parser,
    pipeline::{sort_records, FixtureService},
    types::{LeaguePages, Sport},
    web::{self, AppState},
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List a day's fixtures with a quick pick for each
    List {
        /// basketball, baseball, soccer, hockey or tennis
        #[arg(short, long)]
        sport: Option<Sport>,
        /// League code such as NBA or CPBL
        #[arg(short, long)]
        league: Option<String>,
        /// yesterday, today or tomorrow
        #[arg(short, long, default_value = "today")]
        day: DateOffset,
        /// Only fixtures involving this team
        #[arg(short, long)]
        team: Option<String>,
    },
    /// Analyse the fixtures of one team
    Analyze {
        team: Option<String>,
        #[arg(short, long)]
        sport: Option<Sport>,
        #[arg(short, long)]
        league: Option<String>,
        #[arg(short, long, default_value = "today")]
        day: DateOffset,
    },
    /// Parse saved livescore pages and print normalized records as JSON
    ParseFile {
        /// Saved pre-game board (mode=2)
        #[arg(short, long)]
        preview: PathBuf,
        /// Saved live board
        #[arg(long)]
        live: Option<PathBuf>,
        #[arg(short, long, default_value = "basketball")]
        sport: Sport,
        #[arg(short, long, default_value = "NBA")]
        league: String,
        /// Fixture date, YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run the HTTP query surface
    Serve {
        /// Overrides WEB_BIND_ADDR
        #[arg(short, long)]
        addr: Option<String>,
    },
}

fn read_page(path: &PathBuf) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_file(
    config: &ScraperConfig,
    preview: PathBuf,
    live: Option<PathBuf>,
    sport: Sport,
    league: &str,
    date: NaiveDate,
) -> Result<()> {
    let Some(league) = leagues::resolve(sport, league) else {
        bail!("League {} is not a supported {} league", league, sport);
    };

    let preview = read_page(&preview)?;
    let raws = match live {
        Some(path) => {
            let pages = LeaguePages {
                preview,
                live: read_page(&path)?,
            };
            page_parser::parse(&pages, sport)?
        }
        None => page_parser::parse_preview(&preview)?,
    };

    let mut aliases = AliasTable::with_defaults();
    if let Some(path) = &config.analysis.team_aliases_file {
        aliases.load_file(path)?;
    }
    let normalizer = Normalizer::new(aliases, config.analysis.form_window);
    let mut records = normalizer.normalize_all(&raws, league, date);
    sort_records(&mut records);

    info!("Parsed {} of {} fixtures", records.len(), raws.len());
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn run_command(config: &ScraperConfig, command: Command) -> Result<()> {
    let fetcher = WebHtmlFetcher::new(&config.scraping)?;
    let service = FixtureService::new(fetcher, config)?;

    let text = match service.handle(&command).await {
        Ok(reply) => reply.render(config.service.max_reply_chars),
        Err(e) => {
            info!("Command failed: {}", e);
            e.user_message()
        }
    };
    println!("{}", text);

    let metrics = service.stats();
    info!(
        "{} requests ({} failed, {} retries), avg {:.0}ms, {} leagues cached",
        metrics.total_requests,
        metrics.failed_requests,
        metrics.retries,
        metrics.avg_response_time_ms,
        metrics.cache_entries
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env();
    let today = source_today(config.service.source_utc_offset_hours);

    match cli.command {
        Commands::List {
            sport,
            league,
            day,
            team,
        } => {
            let mut command = Command::list(sport, day.resolve(today)).with_league(league);
            command.team_filter = team;
            run_command(&config, command).await?;
        }
        Commands::Analyze {
            team,
            sport,
            league,
            day,
        } => {
            let command = Command::analyze(team, day.resolve(today))
                .with_sport(sport)
                .with_league(league);
            run_command(&config, command).await?;
        }
        Commands::ParseFile {
            preview,
            live,
            sport,
            league,
            date,
        } => {
            parse_file(&config, preview, live, sport, &league, date.unwrap_or(today))?;
        }
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.web.bind_addr.clone());
            let fetcher = WebHtmlFetcher::new(&config.scraping)?;
            let service = FixtureService::new(fetcher, &config)?;
            web::serve(AppState::new(service), &addr).await?;
        }
    }

    Ok(())
}
