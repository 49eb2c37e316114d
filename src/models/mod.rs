use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel used when the provider omits a metadata field.
pub const UNKNOWN_FIELD: &str = "未知";

/// A listed instrument. Keyed by ticker, mutated on every sync, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    pub market: String,
    pub industry: String,
    pub sector: String,
    pub description: String,
    pub is_test_data: bool,
    pub data_source: String,
    pub updated_at: DateTime<Utc>,
}

/// One trading day's OHLCV for an instrument, stamped with the fundamentals
/// snapshot that was valid at ingestion time. Unique on (ticker, trade_date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    /// The provider's daily series carries no turnover, so synced bars store none.
    pub turnover: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub is_test_data: bool,
    pub data_source: String,
    pub created_at: DateTime<Utc>,
}

impl Bar {
    /// Intraday change relative to the open, in percent.
    pub fn change_percent(&self) -> f64 {
        if self.open == 0.0 {
            0.0
        } else {
            (self.close - self.open) / self.open * 100.0
        }
    }
}

/// Snapshot of a market index (上证、深证、创业板).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketIndex {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub change_amount: f64,
    pub change_percent: f64,
    pub volume: i64,
    pub turnover: f64,
    pub is_test_data: bool,
    pub data_source: String,
    pub update_time: DateTime<Utc>,
}

/// Derived technical indicators for one instrument's bar window.
///
/// Not persisted; computed fresh per request. All fields are rounded to two
/// decimals at construction and absent when the window is too short.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSet {
    pub sma5: Option<f64>,
    pub sma20: Option<f64>,
    pub price_change: Option<f64>,
    pub price_change_percent: Option<f64>,
    pub volatility: Option<f64>,
}

impl IndicatorSet {
    pub fn is_empty(&self) -> bool {
        self.sma5.is_none()
            && self.sma20.is_none()
            && self.price_change.is_none()
            && self.price_change_percent.is_none()
            && self.volatility.is_none()
    }
}

/// Investment recommendation derived from model output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Buy => "BUY",
            Recommendation::Hold => "HOLD",
            Recommendation::Sell => "SELL",
        }
    }
}

/// Risk tier attached to an analysis, derived from its confidence score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            RiskTier::Low
        } else if confidence > 0.6 {
            RiskTier::Moderate
        } else {
            RiskTier::High
        }
    }
}

/// A stored AI analysis. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticker: String,
    pub analysis_type: String,
    pub recommendation: Recommendation,
    pub confidence_score: f64,
    pub overall_score: Option<i32>,
    pub analysis_text: String,
    pub created_at: DateTime<Utc>,
}

/// Instrument + latest-bar projection served by /stocks and /strategies/screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockSnapshot {
    pub ticker: String,
    pub name: String,
    pub market: String,
    pub industry: String,
    pub price: f64,
    pub change_percent: f64,
    pub volume: i64,
    pub turnover: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub trade_date: NaiveDate,
    pub is_test_data: bool,
    pub data_source: String,
}

impl StockSnapshot {
    pub fn from_parts(instrument: &Instrument, bar: &Bar) -> Self {
        Self {
            ticker: instrument.ticker.clone(),
            name: instrument.name.clone(),
            market: instrument.market.clone(),
            industry: instrument.industry.clone(),
            price: bar.close,
            change_percent: (bar.change_percent() * 100.0).round() / 100.0,
            volume: bar.volume,
            turnover: bar.turnover,
            market_cap: bar.market_cap,
            pe_ratio: bar.pe_ratio,
            pb_ratio: bar.pb_ratio,
            trade_date: bar.trade_date,
            is_test_data: instrument.is_test_data || bar.is_test_data,
            data_source: bar.data_source.clone(),
        }
    }
}

/// Query window for the data-sync endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    OneDay,
    OneWeek,
    OneMonth,
    ThreeMonths,
    OneYear,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1D" => Some(Period::OneDay),
            "1W" => Some(Period::OneWeek),
            "1M" => Some(Period::OneMonth),
            "3M" => Some(Period::ThreeMonths),
            "1Y" => Some(Period::OneYear),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1D",
            Period::OneWeek => "1W",
            Period::OneMonth => "1M",
            Period::ThreeMonths => "3M",
            Period::OneYear => "1Y",
        }
    }

    /// Calendar days of history covered by this window.
    pub fn days(&self) -> i64 {
        match self {
            Period::OneDay => 1,
            Period::OneWeek => 7,
            Period::OneMonth => 30,
            Period::ThreeMonths => 90,
            Period::OneYear => 365,
        }
    }
}
