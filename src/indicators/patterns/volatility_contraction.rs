use crate::indicators::patterns::conditions::RuleOutcome;
use crate::indicators::patterns::utils::is_non_increasing;
use crate::indicators::volatility::VolatilityCalculator;
use crate::models::PriceSeries;
use tracing::debug;

/// Thresholds for the volatility contraction rule.
///
/// Series with at least `extended_min_bars` bars use the extended lookback and
/// the stricter threshold; shorter series fall back to the short lookback.
#[derive(Debug, Clone)]
pub struct VolatilityContractionParams {
    pub atr_period: usize,
    pub min_bars: usize,
    pub extended_min_bars: usize,
    pub short_lookback: usize,
    pub extended_lookback: usize,
    pub short_threshold: f64,
    pub extended_threshold: f64,
}

impl Default for VolatilityContractionParams {
    fn default() -> Self {
        Self {
            atr_period: 14,
            min_bars: 14,
            extended_min_bars: 60,
            short_lookback: 5,
            extended_lookback: 10,
            short_threshold: 0.10,
            extended_threshold: 0.15,
        }
    }
}

// Check for a steadily shrinking ATR over the trailing lookback window
pub fn check_volatility_contraction(
    series: &PriceSeries,
    ticker: &str,
    params: &VolatilityContractionParams,
) -> RuleOutcome {
    if series.len() < params.min_bars {
        return RuleOutcome::NotEnoughData {
            required: params.min_bars,
            available: series.len(),
        };
    }

    let extended = series.len() >= params.extended_min_bars;
    let (lookback, threshold) = if extended {
        (params.extended_lookback, params.extended_threshold)
    } else {
        (params.short_lookback, params.short_threshold)
    };

    let atr = VolatilityCalculator::calculate_atr(series, params.atr_period);
    let trailing = &atr[atr.len().saturating_sub(lookback)..];

    if !is_non_increasing(trailing) {
        debug!("{}: ATR not contracting over last {} bars", ticker, lookback);
        return RuleOutcome::Rejected;
    }

    let (Some(&first), Some(&last)) = (trailing.first(), trailing.last()) else {
        return RuleOutcome::Rejected;
    };
    if first == 0.0 || !first.is_finite() || !last.is_finite() {
        return RuleOutcome::Rejected;
    }

    let decrease = (first - last) / first;
    debug!(
        "{}: ATR decrease {:.4} over {} bars (threshold {})",
        ticker, decrease, lookback, threshold
    );

    if decrease > threshold {
        RuleOutcome::Matched
    } else {
        RuleOutcome::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use chrono::{Duration, TimeZone, Utc};

    // Bars around a flat close of 100 whose true range equals `ranges[i]`
    fn series_from_ranges(ranges: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = ranges
            .iter()
            .enumerate()
            .map(|(i, &r)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: 100.0,
                high: 100.0 + r / 2.0,
                low: 100.0 - r / 2.0,
                close: 100.0,
                volume: 1_000.0,
            })
            .collect();
        PriceSeries::from_bars("VCP.NS", "1d", bars)
    }

    #[test]
    fn short_series_is_not_enough_data() {
        let series = series_from_ranges(&[2.0; 13]);
        let outcome =
            check_volatility_contraction(&series, "VCP.NS", &VolatilityContractionParams::default());
        assert_eq!(
            outcome,
            RuleOutcome::NotEnoughData {
                required: 14,
                available: 13
            }
        );
    }

    #[test]
    fn exactly_fourteen_bars_has_no_defined_atr() {
        let series = series_from_ranges(&[2.0; 14]);
        let outcome =
            check_volatility_contraction(&series, "VCP.NS", &VolatilityContractionParams::default());
        assert_eq!(outcome, RuleOutcome::Rejected);
    }

    #[test]
    fn steadily_shrinking_ranges_match_with_extended_history() {
        let mut ranges = vec![4.0; 50];
        ranges.extend((0..30).map(|i| 4.0 - 0.1 * i as f64));
        let series = series_from_ranges(&ranges);

        let outcome =
            check_volatility_contraction(&series, "VCP.NS", &VolatilityContractionParams::default());
        assert!(outcome.is_match());
    }

    #[test]
    fn flat_ranges_do_not_match() {
        let series = series_from_ranges(&[3.0; 80]);
        let outcome =
            check_volatility_contraction(&series, "VCP.NS", &VolatilityContractionParams::default());
        assert_eq!(outcome, RuleOutcome::Rejected);
    }

    #[test]
    fn a_late_volatility_spike_breaks_monotonicity() {
        let mut ranges = vec![4.0; 50];
        ranges.extend((0..29).map(|i| 4.0 - 0.1 * i as f64));
        ranges.push(20.0);
        let series = series_from_ranges(&ranges);

        let outcome =
            check_volatility_contraction(&series, "VCP.NS", &VolatilityContractionParams::default());
        assert_eq!(outcome, RuleOutcome::Rejected);
    }

    #[test]
    fn short_history_uses_lenient_threshold() {
        // 40 bars: lookback 5, threshold 0.10
        let mut ranges = vec![4.0; 25];
        ranges.extend((0..15).map(|i| 4.0 - 0.2 * i as f64));
        let series = series_from_ranges(&ranges);

        let outcome =
            check_volatility_contraction(&series, "VCP.NS", &VolatilityContractionParams::default());
        assert!(outcome.is_match());
    }
}
