use crate::analysis::{AdHocAnalysisRequest, AnalysisRequest, Analyzer, PricePoint};
use crate::models::{MarketIndex, Period, StockSnapshot};
use crate::screener::{Screener, Strategy};
use crate::store::MarketStore;
use crate::sync::Synchronizer;
use crate::Error;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handler state; one store handle injected at startup.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub synchronizer: Arc<Synchronizer<S>>,
    pub screener: Arc<Screener<S>>,
    pub analyzer: Arc<Analyzer<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            synchronizer: Arc::clone(&self.synchronizer),
            screener: Arc::clone(&self.screener),
            analyzer: Arc::clone(&self.analyzer),
        }
    }
}

pub fn router<S: MarketStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/stocks", get(list_stocks::<S>))
        .route("/market-indices", get(market_indices::<S>))
        .route("/strategies/screen", get(screen_strategy::<S>))
        .route("/stock-data", get(stock_data::<S>))
        .route("/ai-analysis", post(ai_analysis::<S>))
        .with_state(state)
}

/// Maps the error taxonomy onto HTTP statuses and the `{error, details?}`
/// body shape.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            Error::Validation(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            Error::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            Error::RateLimitExceeded { limit, resets_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": self.0.to_string(),
                    "limit": limit,
                    "remaining": 0,
                    "resets_at": resets_at,
                }),
            ),
            Error::Upstream { provider, message } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "服务暂时不可用",
                    "details": format!("{provider}: {message}"),
                }),
            ),
            Error::Database(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "服务器内部错误", "details": e.to_string() }),
            ),
            Error::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "服务器内部错误", "details": message }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct StocksQuery {
    limit: Option<i64>,
    #[serde(rename = "includeTestData")]
    include_test_data: Option<bool>,
}

async fn list_stocks<S: MarketStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<StocksQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(10);
    let include_test_data = query.include_test_data.unwrap_or(false);

    let instruments = state.store.list_instruments(limit, include_test_data).await?;

    // Instruments without any stored bar are not listed
    let mut snapshots: Vec<StockSnapshot> = Vec::with_capacity(instruments.len());
    for instrument in &instruments {
        if let Some(bar) = state.store.latest_bar(&instrument.ticker).await? {
            snapshots.push(StockSnapshot::from_parts(instrument, &bar));
        }
    }

    let test_data_count = snapshots.iter().filter(|s| s.is_test_data).count();

    Ok(Json(json!({
        "success": true,
        "data": snapshots,
        "meta": {
            "total": snapshots.len(),
            "hasTestData": test_data_count > 0,
            "testDataCount": test_data_count,
        }
    })))
}

#[derive(Debug, Deserialize)]
struct IndicesQuery {
    #[serde(rename = "includeTestData")]
    include_test_data: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexView {
    code: String,
    name: String,
    price: f64,
    change: f64,
    change_percent: f64,
    volume: i64,
    turnover: f64,
    is_test_data: bool,
    data_source: String,
    update_time: chrono::DateTime<chrono::Utc>,
}

impl From<MarketIndex> for IndexView {
    fn from(index: MarketIndex) -> Self {
        Self {
            code: index.code,
            name: index.name,
            price: index.price,
            change: index.change_amount,
            change_percent: index.change_percent,
            volume: index.volume,
            turnover: index.turnover,
            is_test_data: index.is_test_data,
            data_source: index.data_source,
            update_time: index.update_time,
        }
    }
}

async fn market_indices<S: MarketStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<IndicesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let include_test_data = query.include_test_data.unwrap_or(false);
    let indices = state.store.list_indices(include_test_data).await?;

    let views: Vec<IndexView> = indices.into_iter().map(IndexView::from).collect();
    let test_data_count = views.iter().filter(|v| v.is_test_data).count();
    let last_update = views.first().map(|v| v.update_time);

    Ok(Json(json!({
        "success": true,
        "data": views,
        "meta": {
            "total": views.len(),
            "hasTestData": test_data_count > 0,
            "testDataCount": test_data_count,
            "lastUpdate": last_update,
        }
    })))
}

#[derive(Debug, Deserialize)]
struct ScreenQuery {
    strategy: Option<String>,
}

async fn screen_strategy<S: MarketStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<ScreenQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = query
        .strategy
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::validation("请指定筛选策略"))?;
    let strategy =
        Strategy::from_id(&id).ok_or_else(|| Error::validation("不支持的策略类型"))?;

    let matches = state.screener.screen(strategy).await?;

    Ok(Json(json!({
        "success": true,
        "strategy": strategy.id(),
        "data": matches,
        "meta": {
            "total": matches.len(),
            "strategy_name": strategy.display_name(),
        }
    })))
}

#[derive(Debug, Deserialize)]
struct StockDataQuery {
    ticker: Option<String>,
    period: Option<String>,
    force: Option<bool>,
}

async fn stock_data<S: MarketStore + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<StockDataQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ticker = query
        .ticker
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::validation("股票代码不能为空"))?;
    // Unrecognized periods fall back to one month
    let period = query
        .period
        .as_deref()
        .and_then(Period::parse)
        .unwrap_or(Period::OneMonth);
    let force = query.force.unwrap_or(false);

    let window = state.synchronizer.fetch_window(&ticker, period, force).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "stock_info": window.instrument,
            "stock_data": window.bars,
            "technical_indicators": window.indicators,
            "period": window.period.as_str(),
            "last_updated": window.last_updated,
        }
    })))
}

/// Combined body for both analysis variants; the store-backed path wins
/// whenever a user id is present.
#[derive(Debug, Deserialize)]
struct AnalysisBody {
    ticker: Option<String>,
    user_id: Option<Uuid>,
    analysis_type: Option<String>,
    #[serde(rename = "stockName")]
    stock_name: Option<String>,
    #[serde(rename = "currentPrice")]
    current_price: Option<f64>,
    #[serde(rename = "priceHistory")]
    price_history: Option<Vec<PricePoint>>,
    volume: Option<f64>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
    #[serde(rename = "peRatio")]
    pe_ratio: Option<f64>,
}

async fn ai_analysis<S: MarketStore + 'static>(
    State(state): State<AppState<S>>,
    Json(body): Json<AnalysisBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = if body.user_id.is_none() && body.current_price.is_some() {
        state
            .analyzer
            .analyze_adhoc(AdHocAnalysisRequest {
                ticker: body.ticker,
                stock_name: body.stock_name,
                current_price: body.current_price,
                price_history: body.price_history,
                volume: body.volume,
                market_cap: body.market_cap,
                pe_ratio: body.pe_ratio,
                analysis_type: body.analysis_type,
            })
            .await?
    } else {
        state
            .analyzer
            .analyze(AnalysisRequest {
                ticker: body.ticker,
                user_id: body.user_id,
                analysis_type: body.analysis_type,
            })
            .await?
    };

    Ok(Json(json!({ "success": true, "data": outcome })))
}
