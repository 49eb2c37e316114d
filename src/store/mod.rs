pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::models::{AnalysisRecord, Bar, Instrument, MarketIndex};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Keyed record store backing the whole pipeline.
///
/// Handlers receive this as an injected `Arc<S>` so tests can substitute
/// [`MemoryStore`] for the production [`PostgresStore`].
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Insert-or-overwrite instrument metadata by ticker.
    async fn upsert_instrument(&self, instrument: &Instrument) -> Result<()>;

    async fn get_instrument(&self, ticker: &str) -> Result<Option<Instrument>>;

    /// Most recently updated instruments first.
    async fn list_instruments(
        &self,
        limit: i64,
        include_test_data: bool,
    ) -> Result<Vec<Instrument>>;

    /// Bulk upsert with conflict target exactly (ticker, trade_date).
    async fn upsert_bars(&self, bars: &[Bar]) -> Result<()>;

    async fn latest_bar(&self, ticker: &str) -> Result<Option<Bar>>;

    /// Bars on or after `from`, most recent first.
    async fn bars_since(&self, ticker: &str, from: NaiveDate) -> Result<Vec<Bar>>;

    /// Up to `limit` most recent bars, most recent first.
    async fn recent_bars(&self, ticker: &str, limit: i64) -> Result<Vec<Bar>>;

    async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()>;

    /// Analyses by `user_id` with created_at in [from, to).
    async fn count_analyses_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64>;

    async fn upsert_index(&self, index: &MarketIndex) -> Result<()>;

    /// Index snapshots, most recently updated first.
    async fn list_indices(&self, include_test_data: bool) -> Result<Vec<MarketIndex>>;
}
