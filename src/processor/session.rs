use crate::cache::ProgressSnapshot;
use crate::models::StockEntry;
use crate::processor::job::ScanKey;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
    Completed,
    Stopped,
    Reset,
}

/// In-memory state of one scan key, mirrored to the progress snapshot
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub key: ScanKey,
    pub state: ScanState,
    pub total: usize,
    pub processed: BTreeSet<String>,
    pub matching: Vec<StockEntry>,
    pub issues: Vec<StockEntry>,
    /// When the current run (fresh or resumed) started
    pub started_at: Option<DateTime<Utc>>,
    /// Tickers processed by the current run, excluding restored ones
    pub processed_since_start: usize,
}

pub type SharedSession = Arc<RwLock<ScanSession>>;

impl ScanSession {
    pub fn new(key: ScanKey) -> Self {
        Self {
            key,
            state: ScanState::Idle,
            total: 0,
            processed: BTreeSet::new(),
            matching: Vec::new(),
            issues: Vec::new(),
            started_at: None,
            processed_since_start: 0,
        }
    }

    pub fn shared(key: ScanKey) -> SharedSession {
        Arc::new(RwLock::new(Self::new(key)))
    }

    /// Drop accumulated results, keeping the key
    pub fn clear(&mut self) {
        self.total = 0;
        self.processed.clear();
        self.matching.clear();
        self.issues.clear();
        self.started_at = None;
        self.processed_since_start = 0;
    }

    pub fn begin(&mut self, total: usize, now: DateTime<Utc>) {
        self.state = ScanState::Scanning;
        self.total = total.max(self.processed.len());
        self.started_at = Some(now);
        self.processed_since_start = 0;
    }

    pub fn restore(&mut self, snapshot: ProgressSnapshot) {
        self.total = snapshot.total.max(snapshot.processed.len());
        self.processed = snapshot.processed;
        self.matching = snapshot.matching;
        self.issues = snapshot.issues;
    }

    pub fn mark_processed(&mut self, ticker: &str) {
        if self.processed.insert(ticker.to_string()) {
            self.processed_since_start += 1;
            self.total = self.total.max(self.processed.len());
        }
    }

    pub fn is_processed(&self, ticker: &str) -> bool {
        self.processed.contains(ticker)
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed.len())
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ProgressSnapshot {
        ProgressSnapshot {
            last_update: now,
            total: self.total,
            processed: self.processed.clone(),
            matching: self.matching.clone(),
            issues: self.issues.clone(),
        }
    }

    /// Remaining time at the pace of the current run. None until a ticker
    /// has been processed.
    pub fn eta(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        if self.processed_since_start == 0 {
            return None;
        }

        let elapsed = now.signed_duration_since(started);
        let per_ticker = elapsed / self.processed_since_start as i32;
        Some(per_ticker * self.remaining() as i32)
    }
}

/// Cooperative stop flag, polled by the scan loop once per ticker
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::patterns::PatternKind;
    use crate::processor::job::Exchange;

    fn session() -> ScanSession {
        ScanSession::new(ScanKey::new(PatternKind::LowVolumeConsolidation, "1d", Exchange::Nse))
    }

    #[test]
    fn processed_never_exceeds_total() {
        let mut session = session();
        session.begin(1, Utc::now());
        session.mark_processed("A.NS");
        session.mark_processed("B.NS");
        session.mark_processed("B.NS");

        assert_eq!(session.processed.len(), 2);
        assert_eq!(session.total, 2);
        assert_eq!(session.processed_since_start, 2);
    }

    #[test]
    fn eta_uses_pace_of_current_run_only() {
        let mut session = session();
        session.restore(ProgressSnapshot {
            last_update: Utc::now(),
            total: 10,
            processed: ["A.NS", "B.NS", "C.NS", "D.NS"].iter().map(|s| s.to_string()).collect(),
            matching: vec![],
            issues: vec![],
        });

        let start = Utc::now();
        session.begin(10, start);
        assert_eq!(session.eta(start), None);

        session.mark_processed("E.NS");
        session.mark_processed("F.NS");
        // 2 tickers in 20s, 4 left
        let eta = session.eta(start + Duration::seconds(20)).unwrap();
        assert_eq!(eta, Duration::seconds(40));
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let signal = StopSignal::new();
        let observer = signal.clone();
        signal.request();
        assert!(observer.is_requested());
        observer.clear();
        assert!(!signal.is_requested());
    }
}
