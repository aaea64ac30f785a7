pub mod logger;
pub mod summary;

pub use logger::{ConditionLogEntry, DiagnosticsLogger, ScanCounter, MIN_CONDITIONS_LOGGED};
pub use summary::{ConditionStats, SummaryReport};
