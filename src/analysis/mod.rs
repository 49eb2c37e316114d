pub mod parser;

pub use parser::{ConfidenceScorer, ResponseParser};

use crate::api::GeminiClient;
use crate::models::{AnalysisRecord, Bar, Instrument, Recommendation, RiskTier};
use crate::quota::AnalysisQuota;
use crate::store::MarketStore;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Bars loaded for the store-backed analysis prompt.
const HISTORY_BARS: i64 = 30;

/// Price observations embedded in the prompt.
const PROMPT_OBSERVATIONS: usize = 10;

const DEFAULT_ANALYSIS_TYPE: &str = "comprehensive";

/// Store-backed analysis request: `{ticker, user_id, analysis_type?}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisRequest {
    pub ticker: Option<String>,
    pub user_id: Option<Uuid>,
    pub analysis_type: Option<String>,
}

/// Ad-hoc analysis request with caller-supplied market data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdHocAnalysisRequest {
    pub ticker: Option<String>,
    pub stock_name: Option<String>,
    pub current_price: Option<f64>,
    pub price_history: Option<Vec<PricePoint>>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub analysis_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub change: Option<f64>,
}

/// Structured analysis returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub ticker: String,
    pub analysis_type: String,
    pub recommendation: Recommendation,
    pub confidence_score: f64,
    pub overall_score: Option<i32>,
    pub analysis_text: String,
    pub risk_level: RiskTier,
    /// Quota left today; absent on the ad-hoc path, which is not metered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_analyses: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// Orchestrates one analysis request:
/// validate → check quota → fetch bars → build prompt → invoke model →
/// parse response → persist (failure swallowed) → respond.
pub struct Analyzer<S> {
    store: Arc<S>,
    model: GeminiClient,
    parser: ResponseParser,
    quota: AnalysisQuota,
    scorer: ConfidenceScorer,
}

impl<S: MarketStore> Analyzer<S> {
    pub fn new(store: Arc<S>, model: GeminiClient, quota: AnalysisQuota) -> Self {
        Self {
            store,
            model,
            parser: ResponseParser::new(),
            quota,
            scorer: ConfidenceScorer::default(),
        }
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Store-backed analysis with quota enforcement and persistence.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisOutcome> {
        let ticker = request
            .ticker
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::validation("缺少必要参数：ticker 或 user_id"))?;
        let user_id = request
            .user_id
            .ok_or_else(|| Error::validation("缺少必要参数：ticker 或 user_id"))?;
        let analysis_type = request
            .analysis_type
            .unwrap_or_else(|| DEFAULT_ANALYSIS_TYPE.to_string());

        let count_before = self.quota.check(self.store.as_ref(), user_id).await?;

        let instrument = self
            .store
            .get_instrument(&ticker)
            .await?
            .ok_or_else(|| Error::not_found("未找到股票信息"))?;

        let bars = self.store.recent_bars(&ticker, HISTORY_BARS).await?;
        let latest = bars
            .first()
            .ok_or_else(|| Error::not_found(format!("未找到股票 {ticker} 的数据")))?;

        let prompt = build_stored_prompt(&instrument, latest, &bars);
        let text = self.model.generate(&prompt).await?;

        let recommendation = self.parser.derive_recommendation(&text);
        let confidence = self.scorer.score(&self.parser, &text);
        let overall_score = self.parser.extract_overall_score(&text);
        let created_at = Utc::now();

        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            user_id,
            ticker: ticker.clone(),
            analysis_type: analysis_type.clone(),
            recommendation,
            confidence_score: confidence,
            overall_score,
            analysis_text: text.clone(),
            created_at,
        };

        // The response still succeeds when the insert fails
        if let Err(e) = self.store.insert_analysis(&record).await {
            tracing::warn!("Failed to persist analysis for {}: {}", ticker, e);
        }

        Ok(AnalysisOutcome {
            ticker,
            analysis_type,
            recommendation,
            confidence_score: confidence,
            overall_score,
            analysis_text: text,
            risk_level: RiskTier::from_confidence(confidence),
            remaining_analyses: Some(self.quota.remaining_after(count_before)),
            timestamp: created_at,
        })
    }

    /// Ad-hoc analysis over caller-supplied data. Not metered, not persisted.
    pub async fn analyze_adhoc(
        &self,
        request: AdHocAnalysisRequest,
    ) -> Result<AnalysisOutcome> {
        let has_price = request.current_price.is_some();
        let ticker = request
            .ticker
            .clone()
            .filter(|t| !t.is_empty() && has_price)
            .ok_or_else(|| Error::validation("股票代码和当前价格不能为空"))?;
        let analysis_type = request
            .analysis_type
            .clone()
            .unwrap_or_else(|| DEFAULT_ANALYSIS_TYPE.to_string());

        let prompt = build_adhoc_prompt(&request, &ticker);
        let text = self.model.generate(&prompt).await?;

        let recommendation = self.parser.derive_recommendation(&text);
        let confidence = self.scorer.score(&self.parser, &text);
        let overall_score = self.parser.extract_overall_score(&text);

        Ok(AnalysisOutcome {
            ticker,
            analysis_type,
            recommendation,
            confidence_score: confidence,
            overall_score,
            analysis_text: text,
            risk_level: RiskTier::from_confidence(confidence),
            remaining_analyses: None,
            timestamp: Utc::now(),
        })
    }
}

fn fmt_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v}"))
}

/// Deterministic prompt for the store-backed path: instrument metadata,
/// latest fundamentals and the most recent price observations.
fn build_stored_prompt(instrument: &Instrument, latest: &Bar, bars: &[Bar]) -> String {
    let history: Vec<String> = bars
        .iter()
        .take(PROMPT_OBSERVATIONS)
        .map(|b| {
            format!(
                "{}: ¥{} ({:.2}%)",
                b.trade_date,
                b.close,
                b.change_percent()
            )
        })
        .collect();

    format!(
        r#"请分析以下股票数据并提供投资建议：

股票信息：
- 代码：{ticker}
- 名称：{name}
- 行业：{industry}
- 市场：{market}

最新数据：
- 当前价格：{price}
- 市盈率：{pe}
- 市净率：{pb}
- 市值：{cap}
- 成交量：{volume}

近期价格走势：
{history}

请从以下角度进行分析：
1. 技术分析（价格趋势、支撑阻力位）
2. 基本面分析（估值水平、行业地位）
3. 风险评估（波动性、市场风险）
4. 投资建议（买入/持有/卖出，目标价位）

最后请给出置信度（1-10分）和综合评分（1-10分）。
请用中文回答，保持专业且易懂。
"#,
        ticker = instrument.ticker,
        name = instrument.name,
        industry = instrument.industry,
        market = instrument.market,
        price = latest.close,
        pe = fmt_metric(latest.pe_ratio),
        pb = fmt_metric(latest.pb_ratio),
        cap = fmt_metric(latest.market_cap),
        volume = latest.volume,
        history = history.join("\n"),
    )
}

/// Deterministic prompt for the ad-hoc path, built from caller-supplied data.
fn build_adhoc_prompt(request: &AdHocAnalysisRequest, ticker: &str) -> String {
    let history = match &request.price_history {
        Some(points) if !points.is_empty() => points
            .iter()
            .take(PROMPT_OBSERVATIONS)
            .enumerate()
            .map(|(i, p)| {
                let change = p
                    .change
                    .map_or_else(|| "N/A".to_string(), |c| format!("{c:.2}"));
                format!("第{}天：价格 {}，涨跌幅 {}%", i + 1, p.price, change)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "暂无历史数据".to_string(),
    };

    let unknown = || "未提供".to_string();

    format!(
        r#"你是一位专业的股票分析师，请对以下股票进行全面分析：

## 股票基本信息
- 股票代码：{ticker}
- 股票名称：{name}
- 当前价格：{price}
- 成交量：{volume}
- 市值：{cap}
- 市盈率：{pe}

## 价格历史数据
{history}

## 分析要求
请从以下几个维度进行专业分析，并给出具体的投资建议：
1. 技术分析：价格趋势、支撑位和阻力位、短期走势预测
2. 基本面分析：估值水平、财务健康状况、行业地位
3. 风险评估：主要风险因素、价格波动性、流动性风险
4. 投资建议：明确给出买入/持有/卖出建议、目标价位区间

最后请给出置信度（1-10分）和综合评分（1-10分，10分最好）。
请用中文回答，分析要客观、平衡，既要指出机会也要提醒风险。
"#,
        ticker = ticker,
        name = request.stock_name.clone().unwrap_or_else(|| ticker.to_string()),
        price = request.current_price.map_or_else(unknown, |v| v.to_string()),
        volume = request.volume.map_or_else(unknown, |v| v.to_string()),
        cap = request.market_cap.map_or_else(unknown, |v| v.to_string()),
        pe = request.pe_ratio.map_or_else(unknown, |v| v.to_string()),
        history = history,
    )
}
