use crate::indicators::patterns::conditions::{PatternEvaluation, PatternKind, RuleOutcome};
use crate::indicators::patterns::consolidation;
use crate::indicators::patterns::volatility_contraction::{
    check_volatility_contraction, VolatilityContractionParams,
};
use crate::models::PriceSeries;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct PatternRecognizer {
    volatility: VolatilityContractionParams,
}

impl PatternRecognizer {
    pub fn new(volatility: VolatilityContractionParams) -> Self {
        Self { volatility }
    }

    /// Run one pattern against a series. Never fails: computation problems
    /// come back as [`RuleOutcome::EvaluationError`].
    pub fn evaluate(
        &self,
        pattern: PatternKind,
        series: &PriceSeries,
        ticker: &str,
    ) -> PatternEvaluation {
        let evaluation = match pattern {
            PatternKind::VolatilityContraction => PatternEvaluation {
                pattern,
                outcome: check_volatility_contraction(series, ticker, &self.volatility),
                conditions: None,
            },
            PatternKind::LowVolumeConsolidation | PatternKind::FifteenPercentReversal => {
                let report = consolidation::evaluate_conditions(series, pattern);
                let outcome = consolidation::verdict(series, report.as_ref());
                PatternEvaluation {
                    pattern,
                    outcome,
                    conditions: report.map(|r| r.outcome),
                }
            }
        };

        match &evaluation.outcome {
            RuleOutcome::EvaluationError(reason) => {
                warn!("{} evaluation failed for {}: {}", pattern, ticker, reason);
            }
            outcome => debug!("{} on {}: {:?}", pattern, ticker, outcome),
        }

        evaluation
    }

    /// Convenience predicate for callers that only need the verdict
    pub fn matches(&self, pattern: PatternKind, series: &PriceSeries, ticker: &str) -> bool {
        self.evaluate(pattern, series, ticker).is_match()
    }
}
