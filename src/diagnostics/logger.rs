use crate::diagnostics::summary::SummaryReport;
use crate::indicators::patterns::{ConditionName, PatternEvaluation, PatternKind, RuleOutcome};
use crate::processor::job::ScanKey;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Evaluations meeting fewer conditions than this are not written to the log
pub const MIN_CONDITIONS_LOGGED: usize = 2;

const LOG_FILE: &str = "conditions.jsonl";
const SUMMARY_FILE: &str = "summary.txt";
const COUNTER_FILE: &str = "counter.json";

/// One line of the condition log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub ticker: String,
    pub pattern: PatternKind,
    pub met: Vec<ConditionName>,
    pub failed: Vec<ConditionName>,
}

/// Counters for one scan, from its fresh start through any resumes.
/// Stored next to the condition log so a resumed run or a later summary
/// continues from the same totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounter {
    pub evaluated: usize,
    pub logged: usize,
    pub matched: usize,
    pub errors: usize,
}

/// Writes per-ticker condition outcomes for one scan key
pub struct DiagnosticsLogger {
    folder: PathBuf,
    pattern: PatternKind,
    counter: ScanCounter,
}

impl DiagnosticsLogger {
    /// Logger for the scan folder of `key`, picking up the counter saved by
    /// an earlier run of the same scan
    pub async fn open(log_dir: &Path, key: &ScanKey) -> Self {
        let mut logger = Self {
            folder: log_dir.join(key.cache_key()),
            pattern: key.pattern,
            counter: ScanCounter::default(),
        };
        logger.counter = logger.load_counter().await;
        logger
    }

    pub fn log_path(&self) -> PathBuf {
        self.folder.join(LOG_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.folder.join(SUMMARY_FILE)
    }

    pub fn counter_path(&self) -> PathBuf {
        self.folder.join(COUNTER_FILE)
    }

    pub fn counter(&self) -> ScanCounter {
        self.counter
    }

    async fn load_counter(&self) -> ScanCounter {
        let path = self.counter_path();
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return ScanCounter::default(),
            Err(e) => {
                warn!("Failed to read scan counter {}: {}", path.display(), e);
                return ScanCounter::default();
            }
        };

        serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Ignoring malformed scan counter {}: {}", path.display(), e);
            ScanCounter::default()
        })
    }

    /// Persist the counter so a resumed scan continues from it
    pub async fn save_counter(&self) {
        let path = self.counter_path();
        let result = async {
            fs::create_dir_all(&self.folder).await?;
            fs::write(&path, serde_json::to_vec(&self.counter)?).await?;
            Ok::<_, anyhow::Error>(())
        }
        .await
        .with_context(|| format!("Failed to save scan counter {}", path.display()));

        if let Err(e) = result {
            error!("{:#}", e);
        }
    }

    /// Drop the log and counter of a previous scan so the summary covers only this one
    pub async fn start_fresh(&mut self) {
        self.counter = ScanCounter::default();
        for path in [self.log_path(), self.counter_path()] {
            match fs::remove_file(&path).await {
                Ok(()) => debug!("Cleared {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to clear {}: {}", path.display(), e),
            }
        }
    }

    /// Count an evaluation and log its conditions when enough of them passed
    pub async fn record(&mut self, ticker: &str, evaluation: &PatternEvaluation) {
        self.counter.evaluated += 1;
        match evaluation.outcome {
            RuleOutcome::Matched => self.counter.matched += 1,
            RuleOutcome::EvaluationError(_) => self.counter.errors += 1,
            _ => {}
        }

        let Some(conditions) = &evaluation.conditions else {
            return;
        };
        if conditions.met_count() < MIN_CONDITIONS_LOGGED {
            return;
        }

        let entry = ConditionLogEntry {
            timestamp: Utc::now(),
            ticker: ticker.to_string(),
            pattern: evaluation.pattern,
            met: conditions.met(),
            failed: conditions.failed(),
        };

        match self.append(&entry).await {
            Ok(()) => self.counter.logged += 1,
            Err(e) => error!("Failed to log conditions for {}: {:#}", ticker, e),
        }
    }

    async fn append(&self, entry: &ConditionLogEntry) -> Result<()> {
        fs::create_dir_all(&self.folder).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await?;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// All parseable entries of the current log; malformed lines are skipped
    pub async fn read_entries(&self) -> Vec<ConditionLogEntry> {
        let contents = match fs::read_to_string(self.log_path()).await {
            Ok(contents) => contents,
            Err(_) => return Vec::new(),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping malformed condition log line: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Aggregate the log into a report and write it next to the log
    pub async fn write_summary(&self) -> Option<PathBuf> {
        if self.pattern.conditions().is_empty() {
            return None;
        }

        let report = SummaryReport::from_entries(self.pattern, &self.read_entries().await);
        let path = self.summary_path();

        let result = async {
            fs::create_dir_all(&self.folder).await?;
            fs::write(&path, report.render(&self.counter)).await
        }
        .await
        .with_context(|| format!("Failed to write summary {}", path.display()));

        match result {
            Ok(()) => {
                info!("Wrote condition summary to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("{:#}", e);
                None
            }
        }
    }
}
