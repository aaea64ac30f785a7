use crate::diagnostics::logger::{ConditionLogEntry, ScanCounter, MIN_CONDITIONS_LOGGED};
use crate::indicators::patterns::{ConditionName, PatternKind};
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionStats {
    pub passed: usize,
    pub failed: usize,
}

impl ConditionStats {
    pub fn success_rate(&self) -> f64 {
        let total = self.passed + self.failed;
        if total == 0 {
            0.0
        } else {
            self.passed as f64 / total as f64 * 100.0
        }
    }
}

/// Aggregated view of a condition log for one pattern
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    pub pattern: PatternKind,
    pub entries: usize,
    pub per_condition: Vec<(ConditionName, ConditionStats)>,
    /// (conditions met, tickers) ordered from most to fewest conditions met
    pub groups: Vec<(usize, Vec<String>)>,
}

impl SummaryReport {
    /// Build the report from scratch. A ticker logged more than once counts
    /// with its latest entry only.
    pub fn from_entries(pattern: PatternKind, entries: &[ConditionLogEntry]) -> Self {
        let conditions = pattern.conditions();

        let mut latest: BTreeMap<&str, &ConditionLogEntry> = BTreeMap::new();
        for entry in entries.iter().filter(|e| e.pattern == pattern) {
            latest.insert(entry.ticker.as_str(), entry);
        }

        let per_condition = conditions
            .iter()
            .map(|&condition| {
                let mut stats = ConditionStats::default();
                for entry in latest.values() {
                    if entry.met.contains(&condition) {
                        stats.passed += 1;
                    } else if entry.failed.contains(&condition) {
                        stats.failed += 1;
                    }
                }
                (condition, stats)
            })
            .collect();

        let max = conditions.len().max(MIN_CONDITIONS_LOGGED);
        let groups = (MIN_CONDITIONS_LOGGED..=max)
            .rev()
            .map(|met| {
                // BTreeMap keys are already in ticker order
                let tickers = latest
                    .iter()
                    .filter(|(_, entry)| entry.met.len() == met)
                    .map(|(ticker, _)| ticker.to_string())
                    .collect();
                (met, tickers)
            })
            .collect();

        Self {
            pattern,
            entries: latest.len(),
            per_condition,
            groups,
        }
    }

    pub fn render(&self, counter: &ScanCounter) -> String {
        let total = self.pattern.conditions().len();
        let mut out = String::new();

        let _ = writeln!(out, "{} condition summary", self.pattern);
        let _ = writeln!(out, "Tickers evaluated: {}", counter.evaluated);
        let _ = writeln!(out, "Tickers logged (>= {} conditions): {}", MIN_CONDITIONS_LOGGED, self.entries);
        let _ = writeln!(out, "Full matches: {}", counter.matched);
        let _ = writeln!(out);

        let _ = writeln!(out, "Condition results:");
        for (condition, stats) in &self.per_condition {
            let _ = writeln!(
                out,
                "  {:<26} passed {:>5}  failed {:>5}  ({:.1}%)  {}",
                condition.as_str(),
                stats.passed,
                stats.failed,
                stats.success_rate(),
                condition.description()
            );
        }
        let _ = writeln!(out);

        for (met, tickers) in &self.groups {
            let _ = writeln!(out, "{}/{} conditions met ({}):", met, total, tickers.len());
            if tickers.is_empty() {
                let _ = writeln!(out, "  (none)");
            }
            for ticker in tickers {
                let _ = writeln!(out, "  {}", ticker);
            }
        }

        out
    }
}
