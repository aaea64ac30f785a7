// Module exports
mod conditions;
mod consolidation;
mod recognizer;
mod utils;
mod volatility_contraction;

// Public exports
pub use conditions::{
    ConditionName, ConditionOutcome, PatternError, PatternEvaluation, PatternKind, RuleOutcome,
};
pub use consolidation::SAMPLE_BARS;
pub use recognizer::PatternRecognizer;
pub use volatility_contraction::VolatilityContractionParams;
