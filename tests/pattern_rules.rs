use chrono::{Duration, TimeZone, Utc};
use pattern_screener::diagnostics::DiagnosticsLogger;
use pattern_screener::indicators::patterns::{
    ConditionName, PatternKind, PatternRecognizer, RuleOutcome, SAMPLE_BARS,
};
use pattern_screener::indicators::VolatilityCalculator;
use pattern_screener::models::{Bar, PriceSeries};
use pattern_screener::processor::{Exchange, ScanKey};
use tempfile::TempDir;

const ALL_PATTERNS: [PatternKind; 3] = [
    PatternKind::VolatilityContraction,
    PatternKind::LowVolumeConsolidation,
    PatternKind::FifteenPercentReversal,
];

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

// Flat close of 100 with true range `ranges[i]` from the second bar on
fn series_from_ranges(ranges: &[f64]) -> PriceSeries {
    let bars = ranges
        .iter()
        .enumerate()
        .map(|(i, &r)| Bar {
            timestamp: start() + Duration::days(i as i64),
            open: 100.0,
            high: 100.0 + r / 2.0,
            low: 100.0 - r / 2.0,
            close: 100.0,
            volume: 1_000.0,
        })
        .collect();
    PriceSeries::from_bars("VCP.NS", "1d", bars)
}

/// Base, pop around bar 80, quiet drift: meets every consolidation condition
fn textbook_bars() -> Vec<Bar> {
    (0..SAMPLE_BARS)
        .map(|i| {
            let close = if i == 80 { 105.0 } else { 100.0 };
            let half_range = if i >= 100 { 2.0 } else { 5.0 };
            Bar {
                timestamp: start() + Duration::days(i as i64),
                open: close,
                high: close + half_range,
                low: close - half_range,
                close,
                volume: 10_000.0,
            }
        })
        .collect()
}

fn textbook(bars: Vec<Bar>) -> PriceSeries {
    PriceSeries::from_bars("LUCI.NS", "1d", bars)
}

#[test]
fn short_series_never_match() {
    let recognizer = PatternRecognizer::default();
    for len in [0, 1, 13, 59, SAMPLE_BARS - 1] {
        let series = series_from_ranges(&vec![2.0; len]);
        for pattern in ALL_PATTERNS {
            if pattern == PatternKind::VolatilityContraction && len >= 14 {
                continue;
            }
            let evaluation = recognizer.evaluate(pattern, &series, "SHORT.NS");
            assert!(
                matches!(evaluation.outcome, RuleOutcome::NotEnoughData { .. }),
                "{} on {} bars: {:?}",
                pattern,
                len,
                evaluation.outcome
            );
        }
    }
}

#[test]
fn contracting_atr_sequence_matches_with_extended_lookback() {
    // ATR over the last 15 bars: 2.0, 1.9 .. 1.0, 0.95, 0.9, 0.85, 0.8
    let mut ranges = vec![2.0; 66];
    ranges.extend([0.6; 10]);
    ranges.extend([1.3; 4]);
    let series = series_from_ranges(&ranges);

    let atr = VolatilityCalculator::calculate_atr(&series, 14);
    let expected = [
        2.0, 1.9, 1.8, 1.7, 1.6, 1.5, 1.4, 1.3, 1.2, 1.1, 1.0, 0.95, 0.9, 0.85, 0.8,
    ];
    for (actual, expected) in atr[atr.len() - 15..].iter().zip(expected) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    let recognizer = PatternRecognizer::default();
    let evaluation = recognizer.evaluate(PatternKind::VolatilityContraction, &series, "VCP.NS");
    assert_eq!(evaluation.outcome, RuleOutcome::Matched);
    assert!(evaluation.conditions.is_none());
}

#[test]
fn atr_uptick_breaks_the_contraction() {
    let mut ranges = vec![2.0; 66];
    ranges.extend([0.6; 10]);
    ranges.extend([1.3, 1.3, 1.3, 3.0]);
    let series = series_from_ranges(&ranges);

    let recognizer = PatternRecognizer::default();
    assert!(!recognizer.matches(PatternKind::VolatilityContraction, &series, "VCP.NS"));
}

#[test]
fn consolidation_patterns_match_the_textbook_series() {
    let recognizer = PatternRecognizer::default();
    let series = textbook(textbook_bars());

    for pattern in [PatternKind::LowVolumeConsolidation, PatternKind::FifteenPercentReversal] {
        let evaluation = recognizer.evaluate(pattern, &series, "LUCI.NS");
        assert_eq!(evaluation.outcome, RuleOutcome::Matched, "{}", pattern);
        assert_eq!(
            evaluation.conditions.map(|c| c.len()),
            Some(pattern.conditions().len())
        );
    }
}

#[tokio::test]
async fn four_of_five_rejects_but_is_logged() {
    let dir = TempDir::new().unwrap();
    let key = ScanKey::new(PatternKind::LowVolumeConsolidation, "1d", Exchange::Nse);
    let mut logger = DiagnosticsLogger::open(dir.path(), &key).await;

    let mut bars = textbook_bars();
    bars[80].open = 100.0;
    bars[80].close = 100.0;
    let evaluation =
        PatternRecognizer::default().evaluate(key.pattern, &textbook(bars), "FLAT.NS");

    assert_eq!(evaluation.outcome, RuleOutcome::Rejected);
    logger.record("FLAT.NS", &evaluation).await;

    let entries = logger.read_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].met.len(), 4);
    assert_eq!(entries[0].failed, vec![ConditionName::VolatilityImpulse]);
}

#[tokio::test]
async fn five_of_six_rejects_but_is_logged() {
    let dir = TempDir::new().unwrap();
    let key = ScanKey::new(PatternKind::FifteenPercentReversal, "1d", Exchange::Nse);
    let mut logger = DiagnosticsLogger::open(dir.path(), &key).await;

    // an intrabar spike after the base window lifts the reversal level to 170
    let mut bars = textbook_bars();
    bars[50].high = 200.0;
    let evaluation = PatternRecognizer::default().evaluate(key.pattern, &textbook(bars), "SPIKE.NS");

    assert_eq!(evaluation.outcome, RuleOutcome::Rejected);
    logger.record("SPIKE.NS", &evaluation).await;

    let entries = logger.read_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].met.len(), 5);
    assert_eq!(entries[0].failed, vec![ConditionName::ReversalLevel]);
    assert_eq!(logger.counter().logged, 1);
    assert_eq!(logger.counter().matched, 0);
}

#[tokio::test]
async fn failed_condition_is_reported_alongside_the_others() {
    let dir = TempDir::new().unwrap();
    let key = ScanKey::new(PatternKind::LowVolumeConsolidation, "1d", Exchange::Nse);
    let mut logger = DiagnosticsLogger::open(dir.path(), &key).await;

    // zero closes in the base window leave its mean undefined
    let mut bars = textbook_bars();
    for bar in bars.iter_mut().take(45) {
        bar.close = 0.0;
    }
    let evaluation = PatternRecognizer::default().evaluate(key.pattern, &textbook(bars), "ZERO.NS");

    assert!(matches!(evaluation.outcome, RuleOutcome::EvaluationError(_)));
    let conditions = evaluation.conditions.clone().unwrap();
    assert_eq!(conditions.get(ConditionName::TightConsolidation), Some(false));
    assert_eq!(conditions.get(ConditionName::SampleSize), Some(true));

    logger.record("ZERO.NS", &evaluation).await;
    assert_eq!(logger.counter().errors, 1);
    assert_eq!(logger.read_entries().await.len(), 1);
}
