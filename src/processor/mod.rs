pub mod job;
pub mod session;
pub mod worker;

pub use job::{Exchange, ScanKey, ScanRequest};
pub use session::{ScanSession, ScanState, SharedSession, StopSignal};
pub use worker::{CoordinatorConfig, ResultSource, ScanCoordinator, ScanError, ScanOutcome};
