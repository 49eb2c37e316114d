use crate::models::{AnalysisRecord, Bar, Instrument, MarketIndex};
use crate::store::MarketStore;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory market store.
///
/// Drop-in substitute for [`super::PostgresStore`] in tests and local runs.
/// Bars are kept in a BTreeMap keyed (ticker, trade_date) so range queries
/// and upsert-by-key behave exactly like the relational layout.
#[derive(Default)]
pub struct MemoryStore {
    instruments: RwLock<HashMap<String, Instrument>>,
    bars: RwLock<BTreeMap<(String, NaiveDate), Bar>>,
    analyses: RwLock<Vec<AnalysisRecord>>,
    indices: RwLock<HashMap<String, MarketIndex>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stored bars for a ticker, used by idempotence tests.
    pub async fn bar_count(&self, ticker: &str) -> usize {
        self.bars
            .read()
            .await
            .keys()
            .filter(|(t, _)| t == ticker)
            .count()
    }

    pub async fn analysis_count(&self) -> usize {
        self.analyses.read().await.len()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn upsert_instrument(&self, instrument: &Instrument) -> Result<()> {
        self.instruments
            .write()
            .await
            .insert(instrument.ticker.clone(), instrument.clone());
        Ok(())
    }

    async fn get_instrument(&self, ticker: &str) -> Result<Option<Instrument>> {
        Ok(self.instruments.read().await.get(ticker).cloned())
    }

    async fn list_instruments(
        &self,
        limit: i64,
        include_test_data: bool,
    ) -> Result<Vec<Instrument>> {
        let mut instruments: Vec<Instrument> = self
            .instruments
            .read()
            .await
            .values()
            .filter(|i| include_test_data || !i.is_test_data)
            .cloned()
            .collect();

        instruments.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        instruments.truncate(limit.max(0) as usize);

        Ok(instruments)
    }

    async fn upsert_bars(&self, bars: &[Bar]) -> Result<()> {
        let mut stored = self.bars.write().await;
        for bar in bars {
            stored.insert((bar.ticker.clone(), bar.trade_date), bar.clone());
        }
        Ok(())
    }

    async fn latest_bar(&self, ticker: &str) -> Result<Option<Bar>> {
        Ok(self
            .bars
            .read()
            .await
            .range(
                (ticker.to_string(), NaiveDate::MIN)..=(ticker.to_string(), NaiveDate::MAX),
            )
            .next_back()
            .map(|(_, bar)| bar.clone()))
    }

    async fn bars_since(&self, ticker: &str, from: NaiveDate) -> Result<Vec<Bar>> {
        let mut bars: Vec<Bar> = self
            .bars
            .read()
            .await
            .range((ticker.to_string(), from)..=(ticker.to_string(), NaiveDate::MAX))
            .map(|(_, bar)| bar.clone())
            .collect();

        bars.reverse(); // most recent first
        Ok(bars)
    }

    async fn recent_bars(&self, ticker: &str, limit: i64) -> Result<Vec<Bar>> {
        let bars: Vec<Bar> = self
            .bars
            .read()
            .await
            .range(
                (ticker.to_string(), NaiveDate::MIN)..=(ticker.to_string(), NaiveDate::MAX),
            )
            .rev()
            .take(limit.max(0) as usize)
            .map(|(_, bar)| bar.clone())
            .collect();

        Ok(bars)
    }

    async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        self.analyses.write().await.push(record.clone());
        Ok(())
    }

    async fn count_analyses_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let count = self
            .analyses
            .read()
            .await
            .iter()
            .filter(|a| a.user_id == user_id && a.created_at >= from && a.created_at < to)
            .count();

        Ok(count as i64)
    }

    async fn upsert_index(&self, index: &MarketIndex) -> Result<()> {
        self.indices
            .write()
            .await
            .insert(index.code.clone(), index.clone());
        Ok(())
    }

    async fn list_indices(&self, include_test_data: bool) -> Result<Vec<MarketIndex>> {
        let mut indices: Vec<MarketIndex> = self
            .indices
            .read()
            .await
            .values()
            .filter(|i| include_test_data || !i.is_test_data)
            .cloned()
            .collect();

        indices.sort_by(|a, b| b.update_time.cmp(&a.update_time));
        Ok(indices)
    }
}
