use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::dashboard::{DASHBOARD_HTML, NOT_FOUND_HTML};
use crate::api::diagnostics::{AlphaVantageDiagnostics, DiagnosticReport};
use crate::data::cache::CacheStats;
use crate::data::fetcher::{SourceInfo, SourceTestReport};
use crate::data::DataFetcher;
use crate::error::AppError;
use crate::scanner::{ScanOutcome, Scanner};
use crate::screener::{self, validate_symbols};
use crate::spreads::{aggregate_spreads, detailed_spreads};
use crate::state::ScreenerStore;
use crate::types::{
    CalendarSpreadCandidate, CriteriaUpdate, DataSourceKind, ScreeningCriteria, StockFilter,
    StockRecord, SystemStats,
};

const DEFAULT_PROBE_SYMBOL: &str = "AAPL";

/// Everything a handler can reach. Built once in `main`.
pub struct AppState {
    pub fetcher: Arc<DataFetcher>,
    pub store: Arc<ScreenerStore>,
    pub scanner: Arc<Scanner>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/favicon.ico", get(favicon))
        .route("/api/data", get(get_data))
        .route("/api/stocks", get(get_stocks))
        .route("/api/calendar-spreads", get(get_calendar_spreads))
        .route("/api/calendar-spreads/:symbol", get(get_symbol_spreads))
        .route("/api/screening-criteria", get(get_criteria).post(update_criteria))
        .route("/api/refresh-scan", post(refresh_scan))
        .route("/api/data-source", get(get_data_source).post(set_data_source))
        .route("/api/data-source/test", get(test_data_source))
        .route("/api/symbols", get(get_symbols).post(set_symbols))
        .route("/api/export/stocks", get(export_stocks))
        .route("/api/diagnostics", get(full_diagnostics))
        .route("/api/diagnostics/simple", get(simple_diagnostics))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct StocksQuery {
    pub filter: Option<String>,
}

#[derive(Deserialize)]
pub struct SymbolQuery {
    pub symbol: Option<String>,
}

#[derive(Deserialize)]
pub struct DataSourceRequest {
    pub source: String,
    pub api_key: Option<String>,
}

#[derive(Deserialize)]
pub struct SymbolsRequest {
    pub symbols: Vec<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct DashboardData {
    pub screening_criteria: ScreeningCriteria,
    pub qualified_stocks: Vec<StockRecord>,
    pub all_stocks: Vec<StockRecord>,
    pub calendar_spreads: Vec<CalendarSpreadCandidate>,
    pub system_stats: SystemStats,
    pub data_source: DataSourceKind,
}

#[derive(Serialize)]
pub struct CriteriaResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub criteria: ScreeningCriteria,
    pub stats: SystemStats,
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub status: &'static str,
    pub message: &'static str,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

#[derive(Serialize)]
pub struct DataSourceResponse {
    #[serde(flatten)]
    pub info: SourceInfo,
    pub cache: CacheStats,
}

#[derive(Serialize)]
pub struct DataSourceChanged {
    pub status: &'static str,
    pub message: String,
    pub source: DataSourceKind,
    pub info: SourceInfo,
}

#[derive(Serialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<String>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct SymbolsUpdated {
    pub status: &'static str,
    pub message: String,
    pub symbols: Vec<String>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct Acknowledgement {
    pub status: &'static str,
    pub message: &'static str,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn get_data(State(state): State<Arc<AppState>>) -> Json<DashboardData> {
    state.scanner.ensure_scanned().await;
    let all_stocks = state.store.records(StockFilter::All);
    let qualified_stocks: Vec<StockRecord> = all_stocks.iter().filter(|r| r.qualified).cloned().collect();

    Json(DashboardData {
        screening_criteria: state.store.criteria(),
        calendar_spreads: aggregate_spreads(&all_stocks),
        qualified_stocks,
        all_stocks,
        system_stats: state.store.stats(),
        data_source: state.fetcher.current_source(),
    })
}

async fn get_stocks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StocksQuery>,
) -> Result<Json<Vec<StockRecord>>, AppError> {
    let filter: StockFilter = params
        .filter
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(AppError::BadRequest)?;

    state.scanner.ensure_scanned().await;
    Ok(Json(state.store.records(filter)))
}

async fn get_calendar_spreads(State(state): State<Arc<AppState>>) -> Json<Vec<CalendarSpreadCandidate>> {
    state.scanner.ensure_scanned().await;
    Json(aggregate_spreads(&state.store.records(StockFilter::Qualified)))
}

async fn get_symbol_spreads(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<Vec<CalendarSpreadCandidate>>, AppError> {
    state.scanner.ensure_scanned().await;
    let record = state
        .store
        .record(&symbol)
        .ok_or_else(|| AppError::NotFound(format!("Symbol {} not found", symbol.to_uppercase())))?;
    Ok(Json(detailed_spreads(&record)))
}

async fn get_criteria(State(state): State<Arc<AppState>>) -> Json<ScreeningCriteria> {
    Json(state.store.criteria())
}

async fn update_criteria(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CriteriaUpdate>, JsonRejection>,
) -> Result<Json<CriteriaResponse>, AppError> {
    let Json(update) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let criteria = screener::criteria::merge(&state.store.criteria(), update)?;

    state.scanner.ensure_scanned().await;
    let stats = state.store.update_criteria(criteria.clone());
    info!(qualified = stats.qualified_stocks, "criteria updated");

    Ok(Json(CriteriaResponse {
        status: "success",
        message: "Criteria updated",
        criteria,
        stats,
    }))
}

async fn refresh_scan(State(state): State<Arc<AppState>>) -> Json<ScanResponse> {
    let outcome = state.scanner.refresh().await;
    Json(ScanResponse {
        status: "success",
        message: "Scan completed",
        outcome,
    })
}

async fn get_data_source(State(state): State<Arc<AppState>>) -> Json<DataSourceResponse> {
    Json(DataSourceResponse {
        info: state.fetcher.source_info(),
        cache: state.fetcher.cache_stats(),
    })
}

async fn set_data_source(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DataSourceRequest>, JsonRejection>,
) -> Result<Json<DataSourceChanged>, AppError> {
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let source = state.scanner.switch_source(&req.source, req.api_key).await?;

    Ok(Json(DataSourceChanged {
        status: "success",
        message: format!("Data source changed to {source}"),
        source,
        info: state.fetcher.source_info(),
    }))
}

async fn test_data_source(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SymbolQuery>,
) -> Json<SourceTestReport> {
    Json(state.fetcher.test_data_source(&probe_symbol(params)).await)
}

async fn get_symbols(State(state): State<Arc<AppState>>) -> Json<SymbolsResponse> {
    let symbols = state.store.watchlist();
    Json(SymbolsResponse {
        count: symbols.len(),
        symbols,
    })
}

async fn set_symbols(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SymbolsRequest>, JsonRejection>,
) -> Result<Json<SymbolsUpdated>, AppError> {
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let symbols = validate_symbols(&req.symbols);
    if symbols.is_empty() {
        return Err(AppError::BadRequest("No valid symbols provided".to_string()));
    }

    state.scanner.replace_watchlist(symbols.clone()).await;
    info!(count = symbols.len(), "watchlist replaced");
    Ok(Json(SymbolsUpdated {
        status: "success",
        message: format!("Watchlist updated with {} symbols", symbols.len()),
        count: symbols.len(),
        symbols,
    }))
}

async fn export_stocks() -> Json<Acknowledgement> {
    Json(Acknowledgement {
        status: "success",
        message: "Export functionality would be implemented here",
    })
}

fn diagnostics_for(state: &AppState) -> Result<AlphaVantageDiagnostics, AppError> {
    AlphaVantageDiagnostics::new(
        state.fetcher.base_url_for(DataSourceKind::AlphaVantage),
        state.fetcher.api_key_for(DataSourceKind::AlphaVantage),
    )
}

fn probe_symbol(params: SymbolQuery) -> String {
    params
        .symbol
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_PROBE_SYMBOL.to_string())
}

async fn full_diagnostics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SymbolQuery>,
) -> Result<Json<DiagnosticReport>, AppError> {
    let diag = diagnostics_for(&state)?;
    Ok(Json(diag.run_full(&probe_symbol(params)).await))
}

async fn simple_diagnostics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SymbolQuery>,
) -> Result<Json<DiagnosticReport>, AppError> {
    let diag = diagnostics_for(&state)?;
    Ok(Json(diag.run_simple(&probe_symbol(params)).await))
}

async fn not_found(uri: Uri) -> Response {
    if uri.path().starts_with("/api/") {
        return AppError::NotFound(format!("No route for {}", uri.path())).into_response();
    }
    (StatusCode::NOT_FOUND, Html(NOT_FOUND_HTML)).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
