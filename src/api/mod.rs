use axum::{
    Router,
    extract::{Json, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ServeConfig;
use crate::core::{
    Error, FinancialSnapshot, Portfolio, PortfolioEdit, StressParams, TableView,
    compute_with_view, default_portfolio,
};
use crate::store::{Autosaver, InterchangeDocument, SnapshotStore};

const MAX_MARKET_CRASH_PCT: f64 = 50.0;
const MAX_INTEREST_HIKE_PCT: f64 = 2.0;

#[derive(Parser, Debug)]
#[command(
    name = "strategy-core report",
    about = "Evaluate a household snapshot under a market-crash / rate-hike scenario"
)]
pub struct ReportCli {
    #[arg(
        long,
        help = "Interchange document to evaluate; the built-in household is used when omitted"
    )]
    file: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Drop applied to investment assets, in percent (0-50)"
    )]
    market_crash: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Rate hike applied to pledge and policy loans, in percent (0-2)"
    )]
    interest_hike: f64,
    #[arg(long, help = "Also list assets that back no loan in the risk table")]
    expanded: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    market_crash: Option<f64>,
    interest_hike: Option<f64>,
    expanded: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputePayload {
    portfolio: InterchangeDocument,
    #[serde(flatten)]
    scenario: ScenarioPayload,
}

#[derive(Copy, Clone, Debug)]
struct Scenario {
    stress: StressParams,
    view: TableView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    last_saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponse {
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub struct AppState {
    portfolio: RwLock<Portfolio>,
    autosaver: Autosaver,
}

impl AppState {
    pub fn new(portfolio: Portfolio, autosaver: Autosaver) -> Self {
        Self {
            portfolio: RwLock::new(portfolio),
            autosaver,
        }
    }
}

fn build_stress(market_crash_pct: f64, interest_hike_pct: f64) -> Result<StressParams, String> {
    if !(0.0..=MAX_MARKET_CRASH_PCT).contains(&market_crash_pct) {
        return Err(format!(
            "--market-crash must be between 0 and {MAX_MARKET_CRASH_PCT}"
        ));
    }
    if !(0.0..=MAX_INTEREST_HIKE_PCT).contains(&interest_hike_pct) {
        return Err(format!(
            "--interest-hike must be between 0 and {MAX_INTEREST_HIKE_PCT}"
        ));
    }
    StressParams::new(market_crash_pct / 100.0, interest_hike_pct / 100.0)
        .map_err(|e| e.to_string())
}

fn scenario_from_payload(payload: &ScenarioPayload) -> Result<Scenario, String> {
    let stress = build_stress(
        payload.market_crash.unwrap_or(0.0),
        payload.interest_hike.unwrap_or(0.0),
    )?;
    let view = if payload.expanded.unwrap_or(false) {
        TableView::Expanded
    } else {
        TableView::Compact
    };
    Ok(Scenario { stress, view })
}

/// Loads the document named on the command line (or the built-in household)
/// and renders the evaluation as pretty JSON.
pub fn run_report(cli: ReportCli) -> Result<String, String> {
    let stress = build_stress(cli.market_crash, cli.interest_hike)?;
    let view = if cli.expanded {
        TableView::Expanded
    } else {
        TableView::Compact
    };
    let portfolio = match &cli.file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
            InterchangeDocument::from_json(&raw)
                .and_then(InterchangeDocument::into_portfolio)
                .map_err(|e| format!("{}: {e}", path.display()))?
        }
        None => default_portfolio(),
    };
    let snapshot = compute_with_view(&portfolio, &stress, view);
    serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())
}

pub async fn run_http_server(config: ServeConfig) -> crate::core::Result<()> {
    config
        .validate()
        .map_err(|msg| std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))?;

    let store = Arc::new(SnapshotStore::new(&config.data_file));
    let portfolio = store.load()?;
    let autosaver = Autosaver::spawn(Arc::clone(&store), config.autosave_delay());
    let state = Arc::new(AppState::new(portfolio, autosaver));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, data_file = %config.data_file.display(), "strategy-core API listening");

    axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::try_unwrap(state) {
        Ok(state) => state.autosaver.shutdown().await,
        Err(state) => {
            warn!("state still shared at shutdown, saving current snapshot directly");
            let portfolio = state.portfolio.read().await.clone();
            state.autosaver.save_now(portfolio).await?;
        }
    }
    info!("strategy-core API stopped");
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/portfolio", get(portfolio_handler))
        .route("/api/metrics", get(metrics_handler))
        .route("/api/compute", post(compute_handler))
        .route("/api/edits", post(edit_handler))
        .route("/api/save", post(save_handler))
        .route("/api/export", get(export_handler))
        .route("/api/import", post(import_handler))
        .route("/api/reset", post(reset_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            last_saved_at: state.autosaver.last_saved_at(),
        },
    )
}

async fn portfolio_handler(State(state): State<Arc<AppState>>) -> Response {
    let portfolio = state.portfolio.read().await.clone();
    json_response(StatusCode::OK, portfolio)
}

async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    Query(payload): Query<ScenarioPayload>,
) -> Response {
    let scenario = match scenario_from_payload(&payload) {
        Ok(scenario) => scenario,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let portfolio = state.portfolio.read().await.clone();
    json_response(StatusCode::OK, evaluate(&portfolio, scenario))
}

async fn compute_handler(Json(payload): Json<ComputePayload>) -> Response {
    let scenario = match scenario_from_payload(&payload.scenario) {
        Ok(scenario) => scenario,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match payload.portfolio.into_portfolio() {
        Ok(portfolio) => json_response(StatusCode::OK, evaluate(&portfolio, scenario)),
        Err(e) => core_error_response(&e),
    }
}

async fn edit_handler(
    State(state): State<Arc<AppState>>,
    Json(edit): Json<PortfolioEdit>,
) -> Response {
    let mut current = state.portfolio.write().await;
    match current.apply(edit) {
        Ok(next) => {
            *current = next.clone();
            state.autosaver.schedule(next.clone());
            json_response(StatusCode::OK, next)
        }
        Err(e) => core_error_response(&e),
    }
}

async fn save_handler(State(state): State<Arc<AppState>>) -> Response {
    // Held until the write lands so a concurrent edit cannot be overwritten.
    let current = state.portfolio.read().await;
    match state.autosaver.save_now(current.clone()).await {
        Ok(saved_at) => json_response(StatusCode::OK, SaveResponse { saved_at }),
        Err(e) => core_error_response(&e),
    }
}

async fn export_handler(State(state): State<Arc<AppState>>) -> Response {
    let now = Utc::now();
    let doc = InterchangeDocument::export(&*state.portfolio.read().await, now);
    let mut response = json_response(StatusCode::OK, doc);
    let disposition = format!(
        "attachment; filename=\"Strategy_Core_Backup_{}.json\"",
        now.format("%Y-%m-%d")
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

async fn import_handler(
    State(state): State<Arc<AppState>>,
    Json(doc): Json<InterchangeDocument>,
) -> Response {
    let portfolio = match doc.into_portfolio() {
        Ok(portfolio) => portfolio,
        Err(e) => return core_error_response(&e),
    };
    let mut current = state.portfolio.write().await;
    *current = portfolio.clone();
    info!(
        assets = portfolio.assets.len(),
        liabilities = portfolio.liabilities.len(),
        "snapshot imported"
    );
    if let Err(e) = state.autosaver.save_now(portfolio.clone()).await {
        return core_error_response(&e);
    }
    json_response(StatusCode::OK, portfolio)
}

async fn reset_handler(State(state): State<Arc<AppState>>) -> Response {
    let portfolio = default_portfolio();
    let mut current = state.portfolio.write().await;
    *current = portfolio.clone();
    if let Err(e) = state.autosaver.clear().await {
        return core_error_response(&e);
    }
    info!("snapshot reset to defaults");
    json_response(StatusCode::OK, portfolio)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn evaluate(portfolio: &Portfolio, scenario: Scenario) -> FinancialSnapshot {
    compute_with_view(portfolio, &scenario.stress, scenario.view)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn core_error_response(err: &Error) -> Response {
    let status = match err {
        Error::UnknownAsset(_) | Error::UnknownLiability(_) => StatusCode::NOT_FOUND,
        Error::Io(_) | Error::SaverStopped => StatusCode::INTERNAL_SERVER_ERROR,
        Error::InvalidStress(_)
        | Error::InvalidValue { .. }
        | Error::DuplicateId(_)
        | Error::EmptyName
        | Error::Json(_) => StatusCode::BAD_REQUEST,
    };
    if status.is_server_error() {
        warn!(error = %err, "request failed");
    }
    error_response(status, &err.to_string())
}
