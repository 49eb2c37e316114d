use crate::api::AlphaVantageClient;
use crate::indicators::compute_indicators;
use crate::models::{Bar, IndicatorSet, Instrument, Period, UNKNOWN_FIELD};
use crate::store::MarketStore;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Result of a windowed data-sync request.
#[derive(Debug)]
pub struct StockDataWindow {
    pub instrument: Option<Instrument>,
    /// Chronological order, oldest first.
    pub bars: Vec<Bar>,
    pub indicators: IndicatorSet,
    pub period: Period,
    pub last_updated: DateTime<Utc>,
}

/// Keeps stored daily series fresh against the external provider and serves
/// date-bounded windows out of the store.
pub struct Synchronizer<S> {
    store: Arc<S>,
    provider: AlphaVantageClient,
}

impl<S: MarketStore> Synchronizer<S> {
    pub fn new(store: Arc<S>, provider: AlphaVantageClient) -> Self {
        Self { store, provider }
    }

    /// Fetch the bar window for `ticker`, refreshing from the provider first
    /// when the stored series is stale or `force` is set.
    ///
    /// A failed refresh never fails the request; whatever is already stored
    /// is served instead.
    pub async fn fetch_window(
        &self,
        ticker: &str,
        period: Period,
        force: bool,
    ) -> Result<StockDataWindow> {
        if ticker.is_empty() {
            return Err(Error::validation("股票代码不能为空"));
        }

        let today = Utc::now().date_naive();
        let latest = self.store.latest_bar(ticker).await?;
        let stale = latest.as_ref().map(|b| b.trade_date < today).unwrap_or(true);

        if force || stale {
            if let Err(e) = self.refresh(ticker).await {
                tracing::warn!(
                    "Refresh failed for {}, serving stored data: {}",
                    ticker,
                    e
                );
            }
        }

        let from = today - Duration::days(period.days());
        let mut bars = self.store.bars_since(ticker, from).await?;
        let indicators = compute_indicators(&bars);
        let last_updated = bars
            .first()
            .map(|b| b.created_at)
            .unwrap_or_else(Utc::now);

        bars.reverse(); // chronological for the response

        let instrument = self.store.get_instrument(ticker).await?;

        Ok(StockDataWindow {
            instrument,
            bars,
            indicators,
            period,
            last_updated,
        })
    }

    /// Pull overview + daily series from the provider and upsert everything.
    async fn refresh(&self, ticker: &str) -> Result<()> {
        let overview = self.provider.get_overview(ticker).await?;
        let records = self.provider.get_daily_series(ticker).await?;
        let now = Utc::now();

        if overview.symbol.is_some() {
            let instrument = Instrument {
                ticker: ticker.to_string(),
                name: overview.name.clone().unwrap_or_else(|| ticker.to_string()),
                market: overview
                    .exchange
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
                industry: overview
                    .industry
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
                sector: overview
                    .sector
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
                description: overview.description.clone().unwrap_or_default(),
                is_test_data: false,
                data_source: "API".to_string(),
                updated_at: now,
            };
            self.store.upsert_instrument(&instrument).await?;
        }

        // The provider has no per-day fundamentals; every bar gets stamped
        // with the snapshot from the overview call.
        let pe_ratio = overview.pe_ratio();
        let pb_ratio = overview.pb_ratio();
        let market_cap = overview.market_cap();

        let bars: Vec<Bar> = records
            .into_iter()
            .map(|r| Bar {
                ticker: ticker.to_string(),
                trade_date: r.trade_date,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
                turnover: None,
                pe_ratio,
                pb_ratio,
                market_cap,
                is_test_data: false,
                data_source: "API".to_string(),
                created_at: now,
            })
            .collect();

        let count = bars.len();
        self.store.upsert_bars(&bars).await?;

        tracing::info!("Synced {} bars for {}", count, ticker);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn seeded_bar(ticker: &str, trade_date: NaiveDate, close: f64) -> Bar {
        Bar {
            ticker: ticker.to_string(),
            trade_date,
            open: close - 0.5,
            high: close + 0.5,
            low: close - 1.0,
            close,
            volume: 1_000_000,
            turnover: Some(2.5e8),
            pe_ratio: Some(9.0),
            pb_ratio: Some(1.1),
            market_cap: Some(3e10),
            is_test_data: true,
            data_source: "TEST".to_string(),
            created_at: Utc::now(),
        }
    }

    /// Provider pointing at a closed port: every fetch fails fast.
    fn dead_provider() -> AlphaVantageClient {
        AlphaVantageClient::with_base_url(
            "demo".to_string(),
            "http://127.0.0.1:1".to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_ticker_is_validation_error() {
        let store = Arc::new(MemoryStore::new());
        let sync = Synchronizer::new(store, dead_provider());

        let result = sync.fetch_window("", Period::OneMonth, false).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_degrades_to_stored_data() {
        let store = Arc::new(MemoryStore::new());
        let today = Utc::now().date_naive();
        // Stale series: newest stored bar is days old, so a refresh is
        // attempted and fails against the dead provider.
        let bars: Vec<Bar> = (3..9)
            .map(|i| seeded_bar("000001", today - Duration::days(i), 10.0 + i as f64))
            .collect();
        store.upsert_bars(&bars).await.unwrap();

        let sync = Synchronizer::new(Arc::clone(&store), dead_provider());
        let window = sync
            .fetch_window("000001", Period::OneMonth, false)
            .await
            .unwrap();

        assert_eq!(window.bars.len(), 6);
        // Chronological: oldest first
        assert!(window.bars[0].trade_date < window.bars[5].trade_date);
        assert!(!window.indicators.is_empty());
    }

    #[tokio::test]
    async fn test_window_is_date_bounded() {
        let store = Arc::new(MemoryStore::new());
        let today = Utc::now().date_naive();
        store
            .upsert_bars(&[
                seeded_bar("000001", today, 12.0),
                seeded_bar("000001", today - Duration::days(3), 11.0),
                seeded_bar("000001", today - Duration::days(40), 10.0),
            ])
            .await
            .unwrap();

        let sync = Synchronizer::new(Arc::clone(&store), dead_provider());
        let window = sync
            .fetch_window("000001", Period::OneWeek, false)
            .await
            .unwrap();

        // The 40-day-old bar falls outside the 1W window
        assert_eq!(window.bars.len(), 2);
        assert_eq!(window.period.as_str(), "1W");
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_failure_still_serves_fresh_data() {
        let store = Arc::new(MemoryStore::new());
        let today = Utc::now().date_naive();
        store
            .upsert_bars(&[seeded_bar("000001", today, 12.0)])
            .await
            .unwrap();

        let sync = Synchronizer::new(Arc::clone(&store), dead_provider());
        // force=true attempts the provider even though data is current
        let window = sync
            .fetch_window("000001", Period::OneDay, true)
            .await
            .unwrap();

        assert_eq!(window.bars.len(), 1);
    }
}
