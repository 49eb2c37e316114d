use crate::models::Recommendation;
use regex::Regex;

/// Keywords counted toward a BUY recommendation.
pub const BULLISH_LEXICON: [&str; 5] = ["买入", "上涨", "看好", "推荐", "积极"];

/// Keywords counted toward a SELL recommendation.
pub const BEARISH_LEXICON: [&str; 5] = ["卖出", "下跌", "风险", "谨慎", "回调"];

/// Confidence used when the text carries no recognizable score.
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Structured fields extracted from free-form model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub overall_score: Option<i32>,
}

/// Extracts structured fields from free-form model output.
///
/// The extraction rules are fixed here so orchestration code never touches
/// raw text: lexicon hit counting for the recommendation, `置信度：N` /
/// `N分` for confidence (scored 1-10, normalized to [0,1]) and
/// `综合评分：N` / `评分：N` for the overall score.
pub struct ResponseParser {
    confidence_re: Regex,
    score_suffix_re: Regex,
    overall_score_re: Regex,
    score_re: Regex,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            confidence_re: Regex::new(r"置信度[：:]\s*(\d+)").unwrap(),
            score_suffix_re: Regex::new(r"(\d+)分").unwrap(),
            overall_score_re: Regex::new(r"综合评分[：:]\s*(\d+)").unwrap(),
            score_re: Regex::new(r"评分[：:]\s*(\d+)").unwrap(),
        }
    }

    pub fn parse(&self, text: &str) -> ParsedAnalysis {
        ParsedAnalysis {
            recommendation: self.derive_recommendation(text),
            confidence: self.extract_confidence(text),
            overall_score: self.extract_overall_score(text),
        }
    }

    /// Count lexicon entries present in the text (case-insensitive).
    /// Strictly more bullish hits means BUY, strictly more bearish means
    /// SELL; ties — including zero hits on both sides — mean HOLD.
    pub fn derive_recommendation(&self, text: &str) -> Recommendation {
        let lower = text.to_lowercase();

        let bullish = BULLISH_LEXICON
            .iter()
            .filter(|word| lower.contains(*word))
            .count();
        let bearish = BEARISH_LEXICON
            .iter()
            .filter(|word| lower.contains(*word))
            .count();

        if bullish > bearish {
            Recommendation::Buy
        } else if bearish > bullish {
            Recommendation::Sell
        } else {
            Recommendation::Hold
        }
    }

    /// Extract the 1-10 confidence score and normalize it to [0,1].
    /// Falls back to [`DEFAULT_CONFIDENCE`] when no pattern matches.
    pub fn extract_confidence(&self, text: &str) -> f64 {
        let raw = self
            .confidence_re
            .captures(text)
            .or_else(|| self.score_suffix_re.captures(text))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());

        match raw {
            Some(value) => (value / 10.0).clamp(0.0, 1.0),
            None => DEFAULT_CONFIDENCE,
        }
    }

    /// Extract the 1-10 overall score, if the text carries one.
    pub fn extract_overall_score(&self, text: &str) -> Option<i32> {
        self.overall_score_re
            .captures(text)
            .or_else(|| self.score_re.captures(text))
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// Named confidence derivation strategies.
///
/// [`ConfidenceScorer::FromText`] is the production path: confidence is
/// reproducible from the model output alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfidenceScorer {
    /// Deterministic extraction from the generated text.
    #[default]
    FromText,
    /// Draws from roughly [0.6, 0.95] regardless of the text. Kept only for
    /// parity with historic responses; never wired to an endpoint.
    #[deprecated(note = "confidence must be reproducible from model output")]
    Randomized,
}

impl ConfidenceScorer {
    #[allow(deprecated)]
    pub fn score(&self, parser: &ResponseParser, text: &str) -> f64 {
        match self {
            ConfidenceScorer::FromText => parser.extract_confidence(text),
            ConfidenceScorer::Randomized => {
                let noise: f64 = rand::random();
                (0.8 + noise * 0.15).clamp(0.6, 0.95)
            }
        }
    }
}
