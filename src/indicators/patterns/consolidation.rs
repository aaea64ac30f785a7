use crate::indicators::overlaps::OverlapCalculator;
use crate::indicators::patterns::conditions::{
    ConditionName, ConditionOutcome, PatternError, PatternKind, RuleOutcome,
};
use crate::indicators::patterns::utils::{max_of, mean, range_ratio, within};
use crate::models::{PriceSeries, SeriesWindow};

/// Bars the consolidation rules look at
pub const SAMPLE_BARS: usize = 120;

const TIGHT_WINDOW: usize = 45;
const TIGHT_RANGE: (f64, f64) = (0.05, 0.25);

const IMPULSE_START: usize = 60;
const IMPULSE_END: usize = 100;
const IMPULSE_MOVE: (f64, f64) = (0.03, 0.30);

const QUIET_WINDOW: usize = 20;
const QUIET_VOLUME: (f64, f64) = (0.10, 1.50);
const QUIET_MAX_RANGE: f64 = 0.15;

const EMA_SPAN: usize = 20;
const EMA_WINDOW: usize = 15;
const EMA_MAX_DISTANCE: f64 = 0.05;

const REVERSAL_LOOKBACK: usize = 100;
const REVERSAL_DEPTH: f64 = 0.15;
const REVERSAL_HOLD: usize = 30;

/// Sub-condition results plus the first computation failure, if any.
/// A condition that could not be computed counts as failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionReport {
    pub outcome: ConditionOutcome,
    pub error: Option<PatternError>,
}

/// Evaluate the sub-conditions of a consolidation-family pattern.
///
/// Returns `None` when there is not enough history; the caller reports
/// that as [`RuleOutcome::NotEnoughData`] and does not log it.
pub fn evaluate_conditions(series: &PriceSeries, pattern: PatternKind) -> Option<ConditionReport> {
    if series.len() < SAMPLE_BARS {
        return None;
    }
    let window = series.tail(SAMPLE_BARS);
    let mut error = None;

    let mut pairs = vec![
        (ConditionName::SampleSize, true),
        (
            ConditionName::TightConsolidation,
            settle(tight_consolidation(&window), &mut error),
        ),
        (ConditionName::VolatilityImpulse, volatility_impulse(&window)),
        (
            ConditionName::LowVolumeConsolidation,
            settle(low_volume_consolidation(&window), &mut error),
        ),
        (
            ConditionName::EmaProximity,
            settle(ema_proximity(&window), &mut error),
        ),
    ];
    if pattern == PatternKind::FifteenPercentReversal {
        pairs.push((
            ConditionName::ReversalLevel,
            settle(reversal_level(&window), &mut error),
        ));
    }

    Some(ConditionReport {
        outcome: ConditionOutcome::from_pairs(pairs),
        error,
    })
}

// Failed computations count as unmet; the first error is kept for the verdict
fn settle(result: Result<bool, PatternError>, error: &mut Option<PatternError>) -> bool {
    result.unwrap_or_else(|e| {
        error.get_or_insert(e);
        false
    })
}

/// Fold the condition report into the rule verdict
pub fn verdict(series: &PriceSeries, report: Option<&ConditionReport>) -> RuleOutcome {
    match report {
        Some(ConditionReport {
            error: Some(e), ..
        }) => RuleOutcome::EvaluationError(e.to_string()),
        Some(report) if report.outcome.all_met() => RuleOutcome::Matched,
        Some(_) => RuleOutcome::Rejected,
        None => RuleOutcome::NotEnoughData {
            required: SAMPLE_BARS,
            available: series.len(),
        },
    }
}

fn tight_consolidation(window: &SeriesWindow<'_>) -> Result<bool, PatternError> {
    let ratio = range_ratio(&window.slice(0, TIGHT_WINDOW))?;
    Ok(within(ratio, TIGHT_RANGE.0, TIGHT_RANGE.1))
}

fn volatility_impulse(window: &SeriesWindow<'_>) -> bool {
    let closes = window.slice(IMPULSE_START, IMPULSE_END).close;
    OverlapCalculator::calculate_pct_change(closes)
        .into_iter()
        .any(|change| within(change.abs(), IMPULSE_MOVE.0, IMPULSE_MOVE.1))
}

fn low_volume_consolidation(window: &SeriesWindow<'_>) -> Result<bool, PatternError> {
    let quiet = window.tail(QUIET_WINDOW);

    let overall_volume = mean(window.volume)?;
    let recent_volume = mean(quiet.volume)?;
    let volume_ok = within(
        recent_volume,
        overall_volume * QUIET_VOLUME.0,
        overall_volume * QUIET_VOLUME.1,
    );

    let range_ok = range_ratio(&quiet)? <= QUIET_MAX_RANGE;
    Ok(volume_ok && range_ok)
}

fn ema_proximity(window: &SeriesWindow<'_>) -> Result<bool, PatternError> {
    let ema = OverlapCalculator::calculate_ema(window.close, EMA_SPAN);
    let start = window.len().saturating_sub(EMA_WINDOW);

    let mut near = true;
    for (close, ema) in window.close[start..].iter().zip(&ema[start..]) {
        if *close == 0.0 {
            return Err(PatternError::ZeroDenominator { what: "close" });
        }
        near &= ((close - ema) / close).abs() <= EMA_MAX_DISTANCE;
    }
    Ok(near)
}

fn reversal_level(window: &SeriesWindow<'_>) -> Result<bool, PatternError> {
    let top_high = max_of(window.slice(0, REVERSAL_LOOKBACK).high)?;
    let level = top_high * (1.0 - REVERSAL_DEPTH);
    Ok(window.tail(REVERSAL_HOLD).close.iter().all(|&close| close > level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use chrono::{Duration, TimeZone, Utc};

    /// A series satisfying every consolidation and reversal condition:
    /// a 10% base, a 5% pop around bar 80, then a quiet drift near 100.
    pub(crate) fn textbook_bars() -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..SAMPLE_BARS)
            .map(|i| {
                let close = match i {
                    80 => 105.0,
                    _ => 100.0,
                };
                Bar {
                    timestamp: start + Duration::days(i as i64),
                    open: close,
                    high: close + 5.0,
                    low: close - 5.0,
                    close,
                    volume: 10_000.0,
                }
            })
            .map(|mut bar| {
                // keep the trailing range tight enough for the quiet window
                if bar.timestamp >= start + Duration::days(100) {
                    bar.high = bar.close + 2.0;
                    bar.low = bar.close - 2.0;
                }
                bar
            })
            .collect()
    }

    fn series(bars: Vec<Bar>) -> PriceSeries {
        PriceSeries::from_bars("LUCI.NS", "1d", bars)
    }

    #[test]
    fn textbook_series_meets_every_condition() {
        let s = series(textbook_bars());
        let report = evaluate_conditions(&s, PatternKind::FifteenPercentReversal).unwrap();
        let outcome = report.outcome;

        assert!(report.error.is_none());
        assert_eq!(outcome.len(), 6);
        assert!(outcome.all_met(), "failed: {:?}", outcome.failed());
    }

    #[test]
    fn short_history_is_not_enough_data() {
        let mut bars = textbook_bars();
        bars.truncate(SAMPLE_BARS - 1);
        let s = series(bars);

        let report = evaluate_conditions(&s, PatternKind::LowVolumeConsolidation);
        assert_eq!(report, None);
        assert_eq!(
            verdict(&s, report.as_ref()),
            RuleOutcome::NotEnoughData {
                required: SAMPLE_BARS,
                available: SAMPLE_BARS - 1
            }
        );
    }

    #[test]
    fn no_impulse_fails_only_that_condition() {
        let mut bars = textbook_bars();
        bars[80].close = 100.0;
        bars[80].open = 100.0;
        let s = series(bars);

        let outcome = evaluate_conditions(&s, PatternKind::LowVolumeConsolidation)
            .unwrap()
            .outcome;
        assert_eq!(outcome.failed(), vec![ConditionName::VolatilityImpulse]);
        assert_eq!(outcome.met_count(), 4);
    }

    #[test]
    fn volume_spike_in_quiet_window_fails_low_volume() {
        let mut bars = textbook_bars();
        for bar in bars.iter_mut().skip(SAMPLE_BARS - 20) {
            bar.volume = 100_000.0;
        }
        let s = series(bars);

        let outcome = evaluate_conditions(&s, PatternKind::LowVolumeConsolidation)
            .unwrap()
            .outcome;
        assert_eq!(outcome.get(ConditionName::LowVolumeConsolidation), Some(false));
    }

    #[test]
    fn closes_below_reversal_level_fail_reversal() {
        let mut bars = textbook_bars();
        // an early spike to 200 puts the reversal level at 170
        bars[10].high = 200.0;
        let s = series(bars);

        let report = evaluate_conditions(&s, PatternKind::FifteenPercentReversal).unwrap();
        assert_eq!(report.outcome.get(ConditionName::ReversalLevel), Some(false));
        assert!(!verdict(&s, Some(&report)).is_match());
    }

    #[test]
    fn zero_closes_surface_as_evaluation_error_and_keep_other_conditions() {
        let mut bars = textbook_bars();
        for bar in bars.iter_mut().take(TIGHT_WINDOW) {
            bar.close = 0.0;
        }
        let s = series(bars);

        let report = evaluate_conditions(&s, PatternKind::LowVolumeConsolidation).unwrap();
        assert_eq!(
            report.error,
            Some(PatternError::ZeroDenominator { what: "mean close" })
        );
        assert!(matches!(
            verdict(&s, Some(&report)),
            RuleOutcome::EvaluationError(_)
        ));
        // the base window alone failed; the rest are still reported
        assert_eq!(report.outcome.failed(), vec![ConditionName::TightConsolidation]);
        assert_eq!(report.outcome.met_count(), 4);
    }
}
