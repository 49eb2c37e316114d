use crate::store::MarketStore;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Default per-user daily analysis quota.
pub const DAILY_ANALYSIS_LIMIT: u32 = 10;

/// Half-open [start, end) bounds of the UTC calendar day containing `now`.
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    (start, start + Duration::days(1))
}

/// Per-user daily analysis quota.
///
/// The counter is not stored anywhere; it is recomputed on every call from
/// the analyses recorded during the current UTC day.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisQuota {
    pub daily_limit: u32,
}

impl Default for AnalysisQuota {
    fn default() -> Self {
        Self {
            daily_limit: DAILY_ANALYSIS_LIMIT,
        }
    }
}

impl AnalysisQuota {
    pub fn new(daily_limit: u32) -> Self {
        Self { daily_limit }
    }

    /// Check the quota for `user_id` and return the number of analyses
    /// already recorded today. Fails with [`Error::RateLimitExceeded`] once
    /// the count reaches the daily limit.
    pub async fn check<S: MarketStore + ?Sized>(&self, store: &S, user_id: Uuid) -> Result<u32> {
        let (start, end) = utc_day_bounds(Utc::now());
        let count = store.count_analyses_between(user_id, start, end).await?;

        if count >= self.daily_limit as i64 {
            return Err(Error::RateLimitExceeded {
                limit: self.daily_limit,
                resets_at: end,
            });
        }

        Ok(count as u32)
    }

    /// Analyses left after the one being recorded now.
    pub fn remaining_after(&self, count_before: u32) -> u32 {
        self.daily_limit.saturating_sub(count_before + 1)
    }
}
