use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Chart patterns the screener can scan for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    VolatilityContraction,
    /// Low-volume consolidation, a.k.a. "Lucifer"
    #[value(alias = "lucifer")]
    LowVolumeConsolidation,
    #[value(name = "reversal-15")]
    FifteenPercentReversal,
}

impl PatternKind {
    /// Human readable name used in reports
    pub fn display_name(&self) -> &'static str {
        match self {
            PatternKind::VolatilityContraction => "Volatility Contraction",
            PatternKind::LowVolumeConsolidation => "Lucifer",
            PatternKind::FifteenPercentReversal => "15% Reversal",
        }
    }

    /// Stable identifier used for cache keys and log folders
    pub fn slug(&self) -> &'static str {
        match self {
            PatternKind::VolatilityContraction => "volatility_contraction",
            PatternKind::LowVolumeConsolidation => "lucifer",
            PatternKind::FifteenPercentReversal => "reversal_15",
        }
    }

    /// Named sub-conditions reported for diagnostics. Empty for single-rule patterns.
    pub fn conditions(&self) -> &'static [ConditionName] {
        match self {
            PatternKind::VolatilityContraction => &[],
            PatternKind::LowVolumeConsolidation => &ConditionName::CONSOLIDATION,
            PatternKind::FifteenPercentReversal => &ConditionName::REVERSAL,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionName {
    SampleSize,
    TightConsolidation,
    VolatilityImpulse,
    LowVolumeConsolidation,
    EmaProximity,
    ReversalLevel,
}

impl ConditionName {
    pub const CONSOLIDATION: [ConditionName; 5] = [
        ConditionName::SampleSize,
        ConditionName::TightConsolidation,
        ConditionName::VolatilityImpulse,
        ConditionName::LowVolumeConsolidation,
        ConditionName::EmaProximity,
    ];

    pub const REVERSAL: [ConditionName; 6] = [
        ConditionName::SampleSize,
        ConditionName::TightConsolidation,
        ConditionName::VolatilityImpulse,
        ConditionName::LowVolumeConsolidation,
        ConditionName::EmaProximity,
        ConditionName::ReversalLevel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionName::SampleSize => "sample_size",
            ConditionName::TightConsolidation => "tight_consolidation",
            ConditionName::VolatilityImpulse => "volatility_impulse",
            ConditionName::LowVolumeConsolidation => "low_volume_consolidation",
            ConditionName::EmaProximity => "ema_proximity",
            ConditionName::ReversalLevel => "reversal_level",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConditionName::SampleSize => "At least 120 bars of history",
            ConditionName::TightConsolidation => {
                "First 45 bars trade within 5%-25% of their mean close"
            }
            ConditionName::VolatilityImpulse => {
                "A 3%-30% single-bar move between bars 60 and 100"
            }
            ConditionName::LowVolumeConsolidation => {
                "Last 20 bars: 10%-150% of average volume, range within 15%"
            }
            ConditionName::EmaProximity => "Last 15 closes within 5% of EMA20",
            ConditionName::ReversalLevel => {
                "Last 30 closes above 85% of the high of the first 100 bars"
            }
        }
    }
}

impl fmt::Display for ConditionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of each named sub-condition for one evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionOutcome(BTreeMap<ConditionName, bool>);

impl ConditionOutcome {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ConditionName, bool)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn get(&self, name: ConditionName) -> Option<bool> {
        self.0.get(&name).copied()
    }

    pub fn all_met(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|&met| met)
    }

    pub fn met_count(&self) -> usize {
        self.0.values().filter(|&&met| met).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn met(&self) -> Vec<ConditionName> {
        self.0.iter().filter(|(_, &met)| met).map(|(&name, _)| name).collect()
    }

    pub fn failed(&self) -> Vec<ConditionName> {
        self.0.iter().filter(|(_, &met)| !met).map(|(&name, _)| name).collect()
    }
}

/// Tagged result of running one rule against one series
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Matched,
    Rejected,
    NotEnoughData { required: usize, available: usize },
    EvaluationError(String),
}

impl RuleOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, RuleOutcome::Matched)
    }
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOutcome::Matched => write!(f, "matched"),
            RuleOutcome::Rejected => write!(f, "rejected"),
            RuleOutcome::NotEnoughData { required, available } => {
                write!(f, "not enough data ({} of {} bars)", available, required)
            }
            RuleOutcome::EvaluationError(reason) => write!(f, "evaluation error: {}", reason),
        }
    }
}

/// Full evaluation of a pattern: the verdict plus sub-conditions when the
/// pattern has any and the series was long enough. Conditions that failed to
/// compute are reported as unmet next to an `EvaluationError` verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEvaluation {
    pub pattern: PatternKind,
    pub outcome: RuleOutcome,
    pub conditions: Option<ConditionOutcome>,
}

impl PatternEvaluation {
    pub fn is_match(&self) -> bool {
        self.outcome.is_match()
    }
}

/// Failures raised while computing a rule. They never leave the rule boundary
/// as errors; they are folded into [`RuleOutcome::EvaluationError`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatternError {
    #[error("non-finite {what} in window")]
    NonFinite { what: &'static str },

    #[error("zero {what} in window")]
    ZeroDenominator { what: &'static str },

    #[error("empty window for {what}")]
    EmptyWindow { what: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn met_and_failed_partition_the_outcome() {
        let outcome = ConditionOutcome::from_pairs([
            (ConditionName::SampleSize, true),
            (ConditionName::EmaProximity, false),
            (ConditionName::TightConsolidation, true),
        ]);

        assert_eq!(outcome.met_count(), 2);
        assert_eq!(
            outcome.met(),
            vec![ConditionName::SampleSize, ConditionName::TightConsolidation]
        );
        assert_eq!(outcome.failed(), vec![ConditionName::EmaProximity]);
        assert!(!outcome.all_met());
    }

    #[test]
    fn empty_outcome_is_never_all_met() {
        assert!(!ConditionOutcome::default().all_met());
    }

    #[test]
    fn reversal_is_superset_of_consolidation() {
        let reversal = PatternKind::FifteenPercentReversal.conditions();
        assert!(PatternKind::LowVolumeConsolidation
            .conditions()
            .iter()
            .all(|c| reversal.contains(c)));
        assert_eq!(reversal.len(), 6);
    }
}
