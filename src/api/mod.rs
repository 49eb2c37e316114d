pub mod alphavantage;
pub mod gemini;

pub use alphavantage::{AlphaVantageClient, DailyRecord, OverviewData};
pub use gemini::GeminiClient;
