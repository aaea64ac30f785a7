use crate::indicators::patterns::PatternKind;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Exchange {
    /// National Stock Exchange only
    #[value(name = "NSE", alias = "nse")]
    Nse,
    /// NSE and BSE listings
    #[value(name = "ALL", alias = "all")]
    All,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Nse => write!(f, "NSE"),
            Exchange::All => write!(f, "ALL"),
        }
    }
}

/// Identity of a scan: every cache record and log folder hangs off this triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanKey {
    pub pattern: PatternKind,
    pub interval: String,
    pub exchange: Exchange,
}

impl ScanKey {
    pub fn new(pattern: PatternKind, interval: &str, exchange: Exchange) -> Self {
        Self {
            pattern,
            interval: interval.to_string(),
            exchange,
        }
    }

    pub fn cache_key(&self) -> String {
        format!("{}_{}_{}", self.pattern.slug(), self.interval, self.exchange)
    }
}

impl fmt::Display for ScanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} / {}]", self.pattern, self.interval, self.exchange)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub key: ScanKey,
    /// Ignore any progress snapshot and start over
    pub fresh: bool,
}

impl ScanRequest {
    pub fn new(key: ScanKey) -> Self {
        Self { key, fresh: false }
    }

    pub fn fresh(mut self) -> Self {
        self.fresh = true;
        self
    }
}
