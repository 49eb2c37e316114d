use crate::{Error, Result};
use chrono::NaiveDate;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const ALPHA_VANTAGE_API_BASE: &str = "https://www.alphavantage.co";
const RATE_LIMIT_RPM: u32 = 5; // free tier: 5 requests per minute
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

const PROVIDER: &str = "alphavantage";

// Type alias for the rate limiter to simplify signatures
type ProviderRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Response from the OVERVIEW function. Every field arrives as a string and
/// may be missing, "None" or "-" for unlisted tickers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverviewData {
    #[serde(rename = "Symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Industry")]
    pub industry: Option<String>,
    #[serde(rename = "Sector")]
    pub sector: Option<String>,
    #[serde(rename = "Exchange")]
    pub exchange: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "PERatio")]
    pe_ratio: Option<String>,
    #[serde(rename = "PriceToBookRatio")]
    pb_ratio: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    market_cap: Option<String>,
}

fn parse_metric(raw: &Option<String>) -> Option<f64> {
    raw.as_deref().and_then(|s| s.parse::<f64>().ok())
}

impl OverviewData {
    pub fn pe_ratio(&self) -> Option<f64> {
        parse_metric(&self.pe_ratio)
    }

    pub fn pb_ratio(&self) -> Option<f64> {
        parse_metric(&self.pb_ratio)
    }

    pub fn market_cap(&self) -> Option<f64> {
        parse_metric(&self.market_cap)
    }
}

#[derive(Debug, Deserialize)]
struct DailySeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyQuote>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyQuote {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

/// One parsed row of the daily time series.
#[derive(Debug, Clone)]
pub struct DailyRecord {
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Alpha Vantage client with request rate limiting and bounded retry.
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<ProviderRateLimiter>,
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, ALPHA_VANTAGE_API_BASE.to_string())
    }

    /// Override the API base URL (mocked servers in tests).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::upstream(PROVIDER, format!("failed to build HTTP client: {e}")))?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            api_key,
            base_url,
            rate_limiter,
        })
    }

    /// Make a rate-limited API request, retrying 429/5xx/network failures
    /// with exponential backoff.
    async fn make_request(&self, url: &str) -> Result<reqwest::Response> {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            "Provider returned {}, retrying in {}ms (attempt {}/{})",
                            status,
                            backoff_ms,
                            attempt,
                            MAX_RETRIES
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        continue;
                    }

                    // Other 4xx - don't retry
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::upstream(
                        PROVIDER,
                        format!("API error ({status}): {body}"),
                    ));
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                    tracing::warn!(
                        "Network error: {}, retrying in {}ms (attempt {}/{})",
                        e,
                        backoff_ms,
                        attempt,
                        MAX_RETRIES
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => {
                    return Err(Error::upstream(
                        PROVIDER,
                        format!("network error after {MAX_RETRIES} retries: {e}"),
                    ));
                }
            }
        }

        Err(Error::upstream(
            PROVIDER,
            format!("failed after {MAX_RETRIES} retries"),
        ))
    }

    /// Fetch instrument fundamentals and metadata.
    pub async fn get_overview(&self, ticker: &str) -> Result<OverviewData> {
        let url = format!(
            "{}/query?function=OVERVIEW&symbol={}&apikey={}",
            self.base_url, ticker, self.api_key
        );

        tracing::debug!("Fetching overview for {}", ticker);

        let response = self.make_request(&url).await?;
        let overview: OverviewData = response
            .json()
            .await
            .map_err(|e| Error::upstream(PROVIDER, format!("failed to parse overview: {e}")))?;

        Ok(overview)
    }

    /// Fetch the daily time series, parsed and sorted most recent first.
    pub async fn get_daily_series(&self, ticker: &str) -> Result<Vec<DailyRecord>> {
        let url = format!(
            "{}/query?function=TIME_SERIES_DAILY&symbol={}&apikey={}",
            self.base_url, ticker, self.api_key
        );

        tracing::debug!("Fetching daily series for {}", ticker);

        let response = self.make_request(&url).await?;
        let series: DailySeriesResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream(PROVIDER, format!("failed to parse daily series: {e}")))?;

        if let Some(message) = series.error_message {
            return Err(Error::upstream(PROVIDER, message));
        }
        if let Some(note) = series.note {
            // The free tier answers 200 with a throttle note instead of data
            return Err(Error::upstream(PROVIDER, note));
        }

        let time_series = series
            .time_series
            .ok_or_else(|| Error::upstream(PROVIDER, "no time series in response"))?;

        let mut records = Vec::with_capacity(time_series.len());
        for (date, quote) in time_series {
            let trade_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| Error::upstream(PROVIDER, format!("bad trade date {date}: {e}")))?;
            records.push(DailyRecord {
                trade_date,
                open: parse_price(&quote.open, "open")?,
                high: parse_price(&quote.high, "high")?,
                low: parse_price(&quote.low, "low")?,
                close: parse_price(&quote.close, "close")?,
                volume: quote.volume.parse().unwrap_or(0),
            });
        }

        records.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));

        tracing::debug!("Fetched {} daily records for {}", records.len(), ticker);

        Ok(records)
    }
}

fn parse_price(raw: &str, field: &str) -> Result<f64> {
    raw.parse()
        .map_err(|e| Error::upstream(PROVIDER, format!("bad {field} price {raw}: {e}")))
}
