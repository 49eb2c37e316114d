use crate::models::{Bar, IndicatorSet};

/// Simple moving average over the `period` most recent values.
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period || period == 0 {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Round to two decimals at the output boundary.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the indicator set for a bar window.
///
/// `bars` is most-recent-first, exactly as the store returns it; closes are
/// reversed to chronological order internally. Fewer than 5 bars yields an
/// empty set with no partial fields.
///
/// Volatility is the annualized root-mean-square of per-step simple returns:
/// sqrt(mean(r²)) × sqrt(252), as a percentage. The mean return is NOT
/// subtracted, so this overstates true standard deviation; the biased
/// estimator is kept for numeric compatibility with stored history.
pub fn compute_indicators(bars: &[Bar]) -> IndicatorSet {
    if bars.len() < 5 {
        return IndicatorSet::default();
    }

    let prices: Vec<f64> = bars.iter().rev().map(|b| b.close).collect();

    let sma5 = calculate_sma(&prices, 5);
    let sma20 = calculate_sma(&prices, 20);

    let last = prices[prices.len() - 1];
    let prev = prices[prices.len() - 2];
    let price_change = last - prev;
    let price_change_percent = price_change / prev * 100.0;

    let returns: Vec<f64> = prices
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    let mean_square = returns.iter().map(|r| r * r).sum::<f64>() / returns.len() as f64;
    let volatility = mean_square.sqrt() * (252.0_f64).sqrt();

    IndicatorSet {
        sma5: sma5.map(round2),
        sma20: sma20.map(round2),
        price_change: Some(round2(price_change)),
        price_change_percent: Some(round2(price_change_percent)),
        volatility: Some(round2(volatility * 100.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    /// Bars in most-recent-first order from chronological (open, close) pairs.
    fn bars_from(ohlc: &[(f64, f64)]) -> Vec<Bar> {
        ohlc.iter()
            .enumerate()
            .map(|(i, (open, close))| Bar {
                ticker: "000001".to_string(),
                trade_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: *open,
                high: open.max(*close),
                low: open.min(*close),
                close: *close,
                volume: 1_000_000,
                turnover: None,
                pe_ratio: None,
                pb_ratio: None,
                market_cap: None,
                is_test_data: true,
                data_source: "TEST".to_string(),
                created_at: Utc::now(),
            })
            .rev()
            .collect()
    }

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(calculate_sma(&prices, 5), Some(104.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert!(calculate_sma(&prices, 5).is_none());
    }

    #[test]
    fn test_short_window_yields_empty_set() {
        for n in 0..5 {
            let pairs: Vec<(f64, f64)> = (0..n).map(|i| (100.0, 100.0 + i as f64)).collect();
            let set = compute_indicators(&bars_from(&pairs));
            assert!(set.is_empty(), "expected empty set for {} bars", n);
        }
    }

    #[test]
    fn test_five_bar_scenario() {
        // Oldest → newest closes: 100, 105, 103, 108, 110
        let bars = bars_from(&[
            (95.0, 100.0),
            (100.0, 105.0),
            (101.0, 103.0),
            (104.0, 108.0),
            (107.0, 110.0),
        ]);

        let set = compute_indicators(&bars);
        assert_eq!(set.sma5, Some(105.2));
        assert!(set.sma20.is_none());
        assert_eq!(set.price_change, Some(2.0));
        assert_eq!(set.price_change_percent, Some(1.85));
        assert!(set.volatility.unwrap() > 0.0);
    }

    #[test]
    fn test_sma20_present_with_twenty_bars() {
        let pairs: Vec<(f64, f64)> = (0..20)
            .map(|i| (100.0 + i as f64, 101.0 + i as f64))
            .collect();
        let bars = bars_from(&pairs);

        let set = compute_indicators(&bars);
        // Closes run 101..=120, mean 110.5
        assert_eq!(set.sma20, Some(110.5));
        assert_eq!(set.sma5, Some(118.0));
    }

    #[test]
    fn test_volatility_is_rms_not_stddev() {
        // Constant +1% steps: the RMS estimator reports full volatility even
        // though the deviation around the mean return is zero.
        let mut close = 100.0;
        let mut pairs = Vec::new();
        for _ in 0..10 {
            pairs.push((close, close));
            close *= 1.01;
        }
        let set = compute_indicators(&bars_from(&pairs));

        // sqrt(mean(0.01²)) × sqrt(252) × 100 ≈ 15.87
        let expected = (0.01_f64 * 0.01).sqrt() * 252.0_f64.sqrt() * 100.0;
        let got = set.volatility.unwrap();
        assert!(
            (got - round2(expected)).abs() < 0.05,
            "volatility {} should be close to RMS value {}",
            got,
            expected
        );
    }

    #[test]
    fn test_flat_series_has_zero_volatility() {
        let pairs: Vec<(f64, f64)> = (0..6).map(|_| (50.0, 50.0)).collect();
        let set = compute_indicators(&bars_from(&pairs));
        assert_eq!(set.volatility, Some(0.0));
        assert_eq!(set.price_change, Some(0.0));
    }
}
