use crate::models::{Bar, StockSnapshot};
use crate::store::MarketStore;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Size of the candidate universe materialized per screening run.
pub const UNIVERSE_LIMIT: i64 = 20;

/// Concurrent latest-bar lookups per screening run.
const FETCH_CONCURRENCY: usize = 8;

/// Named screening strategies.
///
/// Each variant carries its predicate and result cap as data; the registry
/// is closed so dispatch is exhaustively matched. Several predicates are
/// deliberately simplified proxies for the named technical pattern and must
/// stay distinct rather than being merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// 0 < PE < 15, 0 < PB < 1.5, market cap > 200亿
    ValueStrategy,
    /// Volume > 1M, turnover > 2亿, closed above the open
    VolumeSurge,
    /// Simplified proxy: close > 5 with volume > 500k
    MaBullish,
    /// Simplified proxy: volume > 500k
    TarmacStrategy,
    /// Simplified proxy: close > 10
    AnnualLineCallback,
    /// Simplified proxy: volume > 1M
    PlatformBreakthrough,
    /// Simplified proxy: close > 5
    TurtleTrading,
    /// Simplified proxy: volume > 800k
    NarrowFlag,
    /// Simplified proxy: close > 8
    LowAtrGrowth,
    /// 0 < PE ≤ 20, 0 < PB ≤ 10
    FundamentalScreening,
    /// Turnover > 2亿, volume > 2M, dropped more than 5% intraday
    VolumeLimitDown,
}

impl Strategy {
    pub const ALL: [Strategy; 11] = [
        Strategy::ValueStrategy,
        Strategy::VolumeSurge,
        Strategy::MaBullish,
        Strategy::TarmacStrategy,
        Strategy::AnnualLineCallback,
        Strategy::PlatformBreakthrough,
        Strategy::TurtleTrading,
        Strategy::NarrowFlag,
        Strategy::LowAtrGrowth,
        Strategy::FundamentalScreening,
        Strategy::VolumeLimitDown,
    ];

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "value_strategy" => Some(Strategy::ValueStrategy),
            "volume_surge" => Some(Strategy::VolumeSurge),
            "ma_bullish" => Some(Strategy::MaBullish),
            "tarmac_strategy" => Some(Strategy::TarmacStrategy),
            "annual_line_callback" => Some(Strategy::AnnualLineCallback),
            "platform_breakthrough" => Some(Strategy::PlatformBreakthrough),
            "turtle_trading" => Some(Strategy::TurtleTrading),
            "narrow_flag" => Some(Strategy::NarrowFlag),
            "low_atr_growth" => Some(Strategy::LowAtrGrowth),
            "fundamental_screening" => Some(Strategy::FundamentalScreening),
            "volume_limit_down" => Some(Strategy::VolumeLimitDown),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Strategy::ValueStrategy => "value_strategy",
            Strategy::VolumeSurge => "volume_surge",
            Strategy::MaBullish => "ma_bullish",
            Strategy::TarmacStrategy => "tarmac_strategy",
            Strategy::AnnualLineCallback => "annual_line_callback",
            Strategy::PlatformBreakthrough => "platform_breakthrough",
            Strategy::TurtleTrading => "turtle_trading",
            Strategy::NarrowFlag => "narrow_flag",
            Strategy::LowAtrGrowth => "low_atr_growth",
            Strategy::FundamentalScreening => "fundamental_screening",
            Strategy::VolumeLimitDown => "volume_limit_down",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Strategy::ValueStrategy => "经典价值策略",
            Strategy::VolumeSurge => "放量上涨策略",
            Strategy::MaBullish => "均线多头策略",
            Strategy::TarmacStrategy => "停机坪策略",
            Strategy::AnnualLineCallback => "回踩年线策略",
            Strategy::PlatformBreakthrough => "突破平台策略",
            Strategy::TurtleTrading => "海龟交易法则",
            Strategy::NarrowFlag => "高而窄的旗形",
            Strategy::LowAtrGrowth => "低ATR成长",
            Strategy::FundamentalScreening => "基本面选股",
            Strategy::VolumeLimitDown => "放量跌停",
        }
    }

    /// Maximum number of matches returned for this strategy.
    pub fn cap(&self) -> usize {
        match self {
            Strategy::ValueStrategy => 30,
            Strategy::VolumeSurge => 30,
            Strategy::MaBullish => 30,
            Strategy::TarmacStrategy => 20,
            Strategy::AnnualLineCallback => 15,
            Strategy::PlatformBreakthrough => 25,
            Strategy::TurtleTrading => 18,
            Strategy::NarrowFlag => 12,
            Strategy::LowAtrGrowth => 22,
            Strategy::FundamentalScreening => 35,
            Strategy::VolumeLimitDown => 8,
        }
    }

    /// Evaluate this strategy's predicate against a candidate's latest bar.
    /// Missing fundamentals fail the predicate.
    pub fn matches(&self, bar: &Bar) -> bool {
        match self {
            Strategy::ValueStrategy => {
                matches!(bar.pe_ratio, Some(pe) if pe > 0.0 && pe < 15.0)
                    && matches!(bar.pb_ratio, Some(pb) if pb > 0.0 && pb < 1.5)
                    && matches!(bar.market_cap, Some(cap) if cap > 2e10)
            }
            Strategy::VolumeSurge => {
                bar.volume > 1_000_000
                    && matches!(bar.turnover, Some(t) if t > 2e8)
                    && bar.close > bar.open
            }
            Strategy::MaBullish => bar.close > 5.0 && bar.volume > 500_000,
            Strategy::TarmacStrategy => bar.volume > 500_000,
            Strategy::AnnualLineCallback => bar.close > 10.0,
            Strategy::PlatformBreakthrough => bar.volume > 1_000_000,
            Strategy::TurtleTrading => bar.close > 5.0,
            Strategy::NarrowFlag => bar.volume > 800_000,
            Strategy::LowAtrGrowth => bar.close > 8.0,
            Strategy::FundamentalScreening => {
                matches!(bar.pe_ratio, Some(pe) if pe > 0.0 && pe <= 20.0)
                    && matches!(bar.pb_ratio, Some(pb) if pb > 0.0 && pb <= 10.0)
            }
            Strategy::VolumeLimitDown => {
                matches!(bar.turnover, Some(t) if t > 2e8)
                    && bar.volume > 2_000_000
                    && bar.open > 0.0
                    && (bar.close - bar.open) / bar.open < -0.05
            }
        }
    }
}

/// Evaluates screening strategies over a bounded candidate universe.
pub struct Screener<S> {
    store: Arc<S>,
    universe_limit: i64,
    concurrency: usize,
}

impl<S: MarketStore + 'static> Screener<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            universe_limit: UNIVERSE_LIMIT,
            concurrency: FETCH_CONCURRENCY,
        }
    }

    /// Screen the universe against `strategy`, returning at most
    /// [`Strategy::cap`] snapshots ordered by candidate rank.
    pub async fn screen(&self, strategy: Strategy) -> Result<Vec<StockSnapshot>> {
        let candidates = self
            .store
            .list_instruments(self.universe_limit, true)
            .await?;

        // Latest-bar lookups run in parallel with bounded concurrency;
        // results are re-ordered by rank afterwards so output stays
        // deterministic.
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(candidates.len());

        for (rank, instrument) in candidates.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();
                let bar = store.latest_bar(&instrument.ticker).await;
                (rank, instrument, bar)
            }));
        }

        let mut resolved = Vec::with_capacity(handles.len());
        for handle in handles {
            let (rank, instrument, bar) = handle
                .await
                .map_err(|e| Error::internal(format!("screener task failed: {e}")))?;
            if let Some(bar) = bar? {
                resolved.push((rank, instrument, bar));
            }
        }

        resolved.sort_by_key(|(rank, _, _)| *rank);

        let matches: Vec<StockSnapshot> = resolved
            .into_iter()
            .filter(|(_, _, bar)| strategy.matches(bar))
            .take(strategy.cap())
            .map(|(_, instrument, bar)| StockSnapshot::from_parts(&instrument, &bar))
            .collect();

        tracing::debug!(
            "Strategy {} matched {} instruments",
            strategy.id(),
            matches.len()
        );

        Ok(matches)
    }
}
