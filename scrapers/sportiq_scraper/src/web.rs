use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    command::{source_today, Command, DateOffset},
    error::{ScrapeError, ServiceError},
    fetcher::HtmlFetcher,
    metrics::ScraperMetrics,
    pipeline::FixtureService,
    types::Sport,
};

pub struct AppState<F: HtmlFetcher> {
    pub service: Arc<FixtureService<F>>,
    pub started_at: DateTime<Utc>,
}

impl<F: HtmlFetcher> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            started_at: self.started_at,
        }
    }
}

impl<F: HtmlFetcher> AppState<F> {
    pub fn new(service: FixtureService<F>) -> Self {
        Self {
            service: Arc::new(service),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FixtureQuery {
    pub day: Option<String>,
    pub league: Option<String>,
    pub team: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalysisQuery {
    pub team: Option<String>,
    pub sport: Option<String>,
    pub day: Option<String>,
    pub league: Option<String>,
}

pub async fn health_handler<F: HtmlFetcher>(State(state): State<AppState<F>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        started_at: state.started_at,
    })
}

pub async fn stats_handler<F: HtmlFetcher>(State(state): State<AppState<F>>) -> Json<ScraperMetrics> {
    Json(state.service.stats())
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

fn resolve_day<F: HtmlFetcher>(state: &AppState<F>, day: Option<&str>) -> Result<chrono::NaiveDate, Response> {
    let offset = day
        .unwrap_or_default()
        .parse::<DateOffset>()
        .map_err(bad_request)?;
    let today = source_today(state.service.service_config().source_utc_offset_hours);
    Ok(offset.resolve(today))
}

async fn run<F: HtmlFetcher>(state: &AppState<F>, command: Command) -> Response {
    match state.service.handle(&command).await {
        Ok(reply) => reply
            .render(state.service.service_config().max_reply_chars)
            .into_response(),
        Err(e) => {
            warn!("Command {:?} failed: {}", command.intent, e);
            let status = match e {
                ServiceError::InvalidCommand(_)
                | ServiceError::Scrape(ScrapeError::UnsupportedLeague { .. }) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, e.user_message()).into_response()
        }
    }
}

pub async fn fixtures_handler<F: HtmlFetcher>(
    State(state): State<AppState<F>>,
    Path(sport): Path<String>,
    Query(query): Query<FixtureQuery>,
) -> Response {
    let sport = match sport.parse::<Sport>() {
        Ok(sport) => sport,
        Err(e) => return bad_request(e),
    };
    let date = match resolve_day(&state, query.day.as_deref()) {
        Ok(date) => date,
        Err(response) => return response,
    };

    let mut command = Command::list(Some(sport), date).with_league(query.league);
    command.team_filter = query.team;
    run(&state, command).await
}

pub async fn analysis_handler<F: HtmlFetcher>(
    State(state): State<AppState<F>>,
    Query(query): Query<AnalysisQuery>,
) -> Response {
    let sport = match query.sport.as_deref().map(str::parse::<Sport>).transpose() {
        Ok(sport) => sport,
        Err(e) => return bad_request(e),
    };
    let date = match resolve_day(&state, query.day.as_deref()) {
        Ok(date) => date,
        Err(response) => return response,
    };

    let command = Command::analyze(query.team, date)
        .with_sport(sport)
        .with_league(query.league);
    run(&state, command).await
}

pub fn router<F: HtmlFetcher + 'static>(state: AppState<F>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<F>))
        .route("/stats", get(stats_handler::<F>))
        .route("/fixtures/{sport}", get(fixtures_handler::<F>))
        .route("/analysis", get(analysis_handler::<F>))
        .with_state(state)
}

pub async fn serve<F: HtmlFetcher + 'static>(state: AppState<F>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Web interface available at http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down web interface");
        })
        .await
        .context("Web server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ScraperConfig, error::FetchError};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct Boards {
        preview: &'static str,
    }

    #[async_trait]
    impl HtmlFetcher for Boards {
        async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
            if url.contains("/livescore/91") {
                return Err(FetchError::Status(404));
            }
            if url.ends_with("mode=2") {
                Ok(self.preview.to_string())
            } else {
                Ok("<html><body></body></html>".to_string())
            }
        }
    }

    const PREVIEW: &str = r#"<html><body>
        <div id="outer-gamebox-7" data-oid="x" data-nameh="Lakers" data-namea="Celtics" data-aheadprice="3.5"></div>
    </body></html>"#;

    fn app() -> Router {
        let mut config = ScraperConfig::default();
        config.rate_limits.requests_per_second = 1000;
        let service = FixtureService::new(Boards { preview: PREVIEW }, &config).unwrap();
        router(AppState::new(service))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""status":"ok""#));
    }

    #[tokio::test]
    async fn test_fixtures_listing() {
        let (status, body) = get(app(), "/fixtures/basketball?league=NBA").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("🏠 Lakers"));
        assert!(body.contains("📌 盤口：Lakers 讓3.5"));
    }

    #[tokio::test]
    async fn test_bad_inputs_are_client_errors() {
        let (status, _) = get(app(), "/fixtures/curling").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(app(), "/fixtures/basketball?day=someday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = get(app(), "/fixtures/basketball?league=XYZ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("XYZ"));
    }

    #[tokio::test]
    async fn test_total_failure_is_bad_gateway() {
        let (status, body) = get(app(), "/fixtures/hockey").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("稍後再試"));
    }

    #[tokio::test]
    async fn test_analysis_by_team() {
        let (status, body) = get(app(), "/analysis?team=celtics&sport=basketball").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("⚡ 賽事分析"));
        assert!(body.contains("【盤口】"));
    }

    #[tokio::test]
    async fn test_stats_reflect_requests() {
        let app = app();
        get(app.clone(), "/fixtures/basketball?league=NBA").await;
        let (_, body) = get(app, "/stats").await;
        let metrics: ScraperMetrics = serde_json::from_str(&body).unwrap();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.cache_entries, 1);
    }
}
