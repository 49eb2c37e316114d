use crate::models::{AnalysisRecord, Bar, Instrument, MarketIndex};
use crate::store::MarketStore;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres-backed market store.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to Postgres and run pending migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::internal(format!("migration failed: {e}")))?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_instrument(row: &sqlx::postgres::PgRow) -> Instrument {
    Instrument {
        ticker: row.get("ticker"),
        name: row.get("name"),
        market: row.get("market"),
        industry: row.get("industry"),
        sector: row.get("sector"),
        description: row.get("description"),
        is_test_data: row.get("is_test_data"),
        data_source: row.get("data_source"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_bar(row: &sqlx::postgres::PgRow) -> Bar {
    Bar {
        ticker: row.get("ticker"),
        trade_date: row.get("trade_date"),
        open: row.get("open_price"),
        high: row.get("high_price"),
        low: row.get("low_price"),
        close: row.get("close_price"),
        volume: row.get("volume"),
        turnover: row.get("turnover"),
        pe_ratio: row.get("pe_ratio"),
        pb_ratio: row.get("pb_ratio"),
        market_cap: row.get("market_cap"),
        is_test_data: row.get("is_test_data"),
        data_source: row.get("data_source"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl MarketStore for PostgresStore {
    async fn upsert_instrument(&self, instrument: &Instrument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stocks_info (
                ticker, name, market, industry, sector, description,
                is_test_data, data_source, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (ticker) DO UPDATE SET
                name = EXCLUDED.name,
                market = EXCLUDED.market,
                industry = EXCLUDED.industry,
                sector = EXCLUDED.sector,
                description = EXCLUDED.description,
                is_test_data = EXCLUDED.is_test_data,
                data_source = EXCLUDED.data_source,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&instrument.ticker)
        .bind(&instrument.name)
        .bind(&instrument.market)
        .bind(&instrument.industry)
        .bind(&instrument.sector)
        .bind(&instrument.description)
        .bind(instrument.is_test_data)
        .bind(&instrument.data_source)
        .bind(instrument.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Upserted instrument {}", instrument.ticker);

        Ok(())
    }

    async fn get_instrument(&self, ticker: &str) -> Result<Option<Instrument>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, name, market, industry, sector, description,
                   is_test_data, data_source, updated_at
            FROM stocks_info
            WHERE ticker = $1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_instrument))
    }

    async fn list_instruments(
        &self,
        limit: i64,
        include_test_data: bool,
    ) -> Result<Vec<Instrument>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, name, market, industry, sector, description,
                   is_test_data, data_source, updated_at
            FROM stocks_info
            WHERE ($2 OR NOT is_test_data)
            ORDER BY updated_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(include_test_data)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_instrument).collect())
    }

    async fn upsert_bars(&self, bars: &[Bar]) -> Result<()> {
        // Conflict target must stay exactly (ticker, trade_date); a daily
        // series is ~100 rows, so one statement per bar.
        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO stocks_daily (
                    ticker, trade_date, open_price, high_price, low_price,
                    close_price, volume, turnover, pe_ratio, pb_ratio,
                    market_cap, is_test_data, data_source, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ON CONFLICT (ticker, trade_date) DO UPDATE SET
                    open_price = EXCLUDED.open_price,
                    high_price = EXCLUDED.high_price,
                    low_price = EXCLUDED.low_price,
                    close_price = EXCLUDED.close_price,
                    volume = EXCLUDED.volume,
                    turnover = EXCLUDED.turnover,
                    pe_ratio = EXCLUDED.pe_ratio,
                    pb_ratio = EXCLUDED.pb_ratio,
                    market_cap = EXCLUDED.market_cap,
                    is_test_data = EXCLUDED.is_test_data,
                    data_source = EXCLUDED.data_source
                "#,
            )
            .bind(&bar.ticker)
            .bind(bar.trade_date)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .bind(bar.turnover)
            .bind(bar.pe_ratio)
            .bind(bar.pb_ratio)
            .bind(bar.market_cap)
            .bind(bar.is_test_data)
            .bind(&bar.data_source)
            .bind(bar.created_at)
            .execute(&self.pool)
            .await?;
        }

        tracing::debug!("Upserted {} bars", bars.len());

        Ok(())
    }

    async fn latest_bar(&self, ticker: &str) -> Result<Option<Bar>> {
        let row = sqlx::query(
            r#"
            SELECT ticker, trade_date, open_price, high_price, low_price,
                   close_price, volume, turnover, pe_ratio, pb_ratio,
                   market_cap, is_test_data, data_source, created_at
            FROM stocks_daily
            WHERE ticker = $1
            ORDER BY trade_date DESC
            LIMIT 1
            "#,
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_bar))
    }

    async fn bars_since(&self, ticker: &str, from: NaiveDate) -> Result<Vec<Bar>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, trade_date, open_price, high_price, low_price,
                   close_price, volume, turnover, pe_ratio, pb_ratio,
                   market_cap, is_test_data, data_source, created_at
            FROM stocks_daily
            WHERE ticker = $1 AND trade_date >= $2
            ORDER BY trade_date DESC
            "#,
        )
        .bind(ticker)
        .bind(from)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_bar).collect())
    }

    async fn recent_bars(&self, ticker: &str, limit: i64) -> Result<Vec<Bar>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, trade_date, open_price, high_price, low_price,
                   close_price, volume, turnover, pe_ratio, pb_ratio,
                   market_cap, is_test_data, data_source, created_at
            FROM stocks_daily
            WHERE ticker = $1
            ORDER BY trade_date DESC
            LIMIT $2
            "#,
        )
        .bind(ticker)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_bar).collect())
    }

    async fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_analyses (
                id, user_id, ticker, analysis_type, recommendation,
                confidence_score, overall_score, analysis_text, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.ticker)
        .bind(&record.analysis_type)
        .bind(record.recommendation.as_str())
        .bind(record.confidence_score)
        .bind(record.overall_score)
        .bind(&record.analysis_text)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_analyses_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM ai_analyses
            WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }

    async fn upsert_index(&self, index: &MarketIndex) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market_indices (
                index_code, index_name, current_price, change_amount,
                change_percent, volume, turnover, is_test_data,
                data_source, update_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (index_code) DO UPDATE SET
                index_name = EXCLUDED.index_name,
                current_price = EXCLUDED.current_price,
                change_amount = EXCLUDED.change_amount,
                change_percent = EXCLUDED.change_percent,
                volume = EXCLUDED.volume,
                turnover = EXCLUDED.turnover,
                is_test_data = EXCLUDED.is_test_data,
                data_source = EXCLUDED.data_source,
                update_time = EXCLUDED.update_time
            "#,
        )
        .bind(&index.code)
        .bind(&index.name)
        .bind(index.price)
        .bind(index.change_amount)
        .bind(index.change_percent)
        .bind(index.volume)
        .bind(index.turnover)
        .bind(index.is_test_data)
        .bind(&index.data_source)
        .bind(index.update_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_indices(&self, include_test_data: bool) -> Result<Vec<MarketIndex>> {
        let rows = sqlx::query(
            r#"
            SELECT index_code, index_name, current_price, change_amount,
                   change_percent, volume, turnover, is_test_data,
                   data_source, update_time
            FROM market_indices
            WHERE ($1 OR NOT is_test_data)
            ORDER BY update_time DESC
            "#,
        )
        .bind(include_test_data)
        .fetch_all(&self.pool)
        .await?;

        let indices = rows
            .iter()
            .map(|row| MarketIndex {
                code: row.get("index_code"),
                name: row.get("index_name"),
                price: row.get("current_price"),
                change_amount: row.get("change_amount"),
                change_percent: row.get("change_percent"),
                volume: row.get("volume"),
                turnover: row.get("turnover"),
                is_test_data: row.get("is_test_data"),
                data_source: row.get("data_source"),
                update_time: row.get("update_time"),
            })
            .collect();

        Ok(indices)
    }
}

