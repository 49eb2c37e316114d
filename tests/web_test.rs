use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use stockscope::analysis::Analyzer;
use stockscope::api::{AlphaVantageClient, GeminiClient};
use stockscope::models::{AnalysisRecord, Bar, Instrument, MarketIndex, Recommendation};
use stockscope::quota::AnalysisQuota;
use stockscope::screener::Screener;
use stockscope::store::{MarketStore, MemoryStore};
use stockscope::sync::Synchronizer;
use stockscope::web::{router, AppState};
use tower::ServiceExt;
use uuid::Uuid;

/// Router over a memory store; upstream clients point at unreachable or
/// mocked servers as each test requires.
fn test_app(store: Arc<MemoryStore>, gemini_url: Option<String>) -> Router {
    let provider = AlphaVantageClient::with_base_url(
        "demo".to_string(),
        "http://127.0.0.1:1".to_string(),
    )
    .unwrap();
    let gemini = GeminiClient::with_base_url(
        "test-key".to_string(),
        gemini_url.unwrap_or_else(|| "http://127.0.0.1:1".to_string()),
    )
    .unwrap();

    let state = AppState {
        store: Arc::clone(&store),
        synchronizer: Arc::new(Synchronizer::new(Arc::clone(&store), provider)),
        screener: Arc::new(Screener::new(Arc::clone(&store))),
        analyzer: Arc::new(Analyzer::new(store, gemini, AnalysisQuota::default())),
    };

    router(state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

fn instrument(ticker: &str, is_test_data: bool) -> Instrument {
    Instrument {
        ticker: ticker.to_string(),
        name: format!("股票{ticker}"),
        market: "A股".to_string(),
        industry: "银行".to_string(),
        sector: "金融".to_string(),
        description: String::new(),
        is_test_data,
        data_source: if is_test_data { "TEST" } else { "API" }.to_string(),
        updated_at: Utc::now(),
    }
}

fn bar(ticker: &str, is_test_data: bool) -> Bar {
    Bar {
        ticker: ticker.to_string(),
        trade_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        open: 12.3,
        high: 12.6,
        low: 12.1,
        close: 12.34,
        volume: 123_000_000,
        turnover: Some(1.52e9),
        pe_ratio: Some(8.5),
        pb_ratio: Some(0.9),
        market_cap: Some(2.456e11),
        is_test_data,
        data_source: if is_test_data { "TEST" } else { "API" }.to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_unknown_strategy_is_400_without_partial_data() {
    let app = test_app(Arc::new(MemoryStore::new()), None);
    let (status, body) = get_json(app, "/strategies/screen?strategy=foo_bar").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "不支持的策略类型");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_missing_strategy_is_400() {
    let app = test_app(Arc::new(MemoryStore::new()), None);
    let (status, body) = get_json(app, "/strategies/screen").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "请指定筛选策略");
}

#[tokio::test]
async fn test_screen_envelope_carries_strategy_meta() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_instrument(&instrument("000001", true)).await.unwrap();
    store.upsert_bars(&[bar("000001", true)]).await.unwrap();

    let app = test_app(store, None);
    let (status, body) = get_json(app, "/strategies/screen?strategy=value_strategy").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["strategy"], "value_strategy");
    assert_eq!(body["meta"]["strategy_name"], "经典价值策略");
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["ticker"], "000001");
    assert_eq!(body["data"][0]["peRatio"], 8.5);
}

#[tokio::test]
async fn test_stocks_listing_filters_test_data_by_default() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_instrument(&instrument("000001", false)).await.unwrap();
    store.upsert_bars(&[bar("000001", false)]).await.unwrap();
    store.upsert_instrument(&instrument("999999", true)).await.unwrap();
    store.upsert_bars(&[bar("999999", true)]).await.unwrap();

    let (status, body) = get_json(
        test_app(Arc::clone(&store), None),
        "/stocks?includeTestData=true&limit=10",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 2);
    assert_eq!(body["meta"]["hasTestData"], true);
    assert_eq!(body["meta"]["testDataCount"], 1);

    let (_, body) = get_json(test_app(store, None), "/stocks").await;
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["meta"]["hasTestData"], false);
    assert_eq!(body["data"][0]["ticker"], "000001");
}

#[tokio::test]
async fn test_market_indices_envelope() {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_index(&MarketIndex {
            code: "sh000001".to_string(),
            name: "上证指数".to_string(),
            price: 3234.56,
            change_amount: 39.87,
            change_percent: 1.25,
            volume: 245_600_000_000,
            turnover: 3.456e11,
            is_test_data: true,
            data_source: "TEST".to_string(),
            update_time: Utc::now(),
        })
        .await
        .unwrap();

    let (status, body) =
        get_json(test_app(store, None), "/market-indices?includeTestData=true").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"][0]["code"], "sh000001");
    assert_eq!(body["data"][0]["changePercent"], 1.25);
    assert_eq!(body["meta"]["total"], 1);
    assert!(body["meta"]["lastUpdate"].is_string());
}

#[tokio::test]
async fn test_stock_data_requires_ticker() {
    let app = test_app(Arc::new(MemoryStore::new()), None);
    let (status, body) = get_json(app, "/stock-data?period=1M").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "股票代码不能为空");
}

#[tokio::test]
async fn test_ai_analysis_missing_fields_is_400() {
    let app = test_app(Arc::new(MemoryStore::new()), None);
    let (status, body) = post_json(app, "/ai-analysis", serde_json::json!({})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "缺少必要参数：ticker 或 user_id");
}

#[tokio::test]
async fn test_ai_analysis_rate_limited_is_429() {
    let store = Arc::new(MemoryStore::new());
    let user_id = Uuid::new_v4();
    for _ in 0..10 {
        store
            .insert_analysis(&AnalysisRecord {
                id: Uuid::new_v4(),
                user_id,
                ticker: "000001".to_string(),
                analysis_type: "comprehensive".to_string(),
                recommendation: Recommendation::Hold,
                confidence_score: 0.7,
                overall_score: None,
                analysis_text: "持有".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let app = test_app(store, None);
    let (status, body) = post_json(
        app,
        "/ai-analysis",
        serde_json::json!({ "ticker": "000001", "user_id": user_id }),
    )
    .await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["remaining"], 0);
    assert_eq!(body["limit"], 10);
    assert!(body["resets_at"].is_string());
}

#[tokio::test]
async fn test_ai_analysis_adhoc_success_envelope() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/models/gemini-pro:generateContent")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [{ "text": "看好后市，建议买入。置信度：8" }],
                        "role": "model"
                    }
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let app = test_app(Arc::new(MemoryStore::new()), Some(server.url()));
    let (status, body) = post_json(
        app,
        "/ai-analysis",
        serde_json::json!({
            "ticker": "600519",
            "stockName": "贵州茅台",
            "currentPrice": 1800.0,
            "priceHistory": [{ "price": 1780.0, "change": -0.5 }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["ticker"], "600519");
    assert_eq!(body["data"]["recommendation"], "BUY");
    assert_eq!(body["data"]["confidence_score"], 0.8);
    assert_eq!(body["data"]["risk_level"], "MODERATE");
    assert!(body["data"].get("remaining_analyses").is_none());
}

#[tokio::test]
async fn test_stock_data_degrades_when_provider_is_down() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_instrument(&instrument("000001", true)).await.unwrap();
    // Today's bar: series is current, no refresh is attempted against the
    // unreachable provider.
    let mut b = bar("000001", true);
    b.trade_date = Utc::now().date_naive();
    store.upsert_bars(&[b]).await.unwrap();

    let app = test_app(store, None);
    let (status, body) = get_json(app, "/stock-data?ticker=000001&period=1W").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["period"], "1W");
    assert_eq!(body["data"]["stock_data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["stock_info"]["ticker"], "000001");
}
