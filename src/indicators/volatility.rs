use crate::indicators::overlaps::OverlapCalculator;
use crate::models::PriceSeries;

pub struct VolatilityCalculator;

impl VolatilityCalculator {
    // Calculate True Range
    // TR = max(high - low, |high - prev_close|, |low - prev_close|)
    // The first bar has no previous close, so its TR is NaN.
    pub fn calculate_true_range(series: &PriceSeries) -> Vec<f64> {
        let mut results = Vec::with_capacity(series.len());
        if series.is_empty() {
            return results;
        }

        results.push(f64::NAN);
        for i in 1..series.len() {
            let high = series.high[i];
            let low = series.low[i];
            let prev_close = series.close[i - 1];

            let range1 = high - low;
            let range2 = (high - prev_close).abs();
            let range3 = (low - prev_close).abs();

            // f64::max drops a NaN operand, so propagate explicitly
            let tr = if range1.is_nan() || range2.is_nan() || range3.is_nan() {
                f64::NAN
            } else {
                range1.max(range2).max(range3)
            };
            results.push(tr);
        }

        results
    }

    // Calculate ATR (Average True Range) as a trailing simple mean of TR.
    // With the leading NaN TR, the first defined value sits at index `period`.
    pub fn calculate_atr(series: &PriceSeries, period: usize) -> Vec<f64> {
        let tr = Self::calculate_true_range(series);
        OverlapCalculator::calculate_sma(&tr, period)
    }
}
