use crate::models::StockEntry;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The three record kinds kept per scan key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVariant {
    Result,
    Progress,
    Final,
}

impl CacheVariant {
    pub fn file_suffix(&self) -> &'static str {
        match self {
            CacheVariant::Result => "",
            CacheVariant::Progress => "_progress",
            CacheVariant::Final => "_final",
        }
    }
}

impl fmt::Display for CacheVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheVariant::Result => write!(f, "result"),
            CacheVariant::Progress => write!(f, "progress"),
            CacheVariant::Final => write!(f, "final"),
        }
    }
}

/// A record that can live in the [`super::CacheStore`]
pub trait CacheRecord {
    const VARIANT: CacheVariant;
    /// Written through a temp file and renamed into place
    const ATOMIC: bool = false;

    /// Whether the record is still usable at `now`
    fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool;

    /// Repair invariants after loading from disk
    fn normalize(self) -> Self
    where
        Self: Sized,
    {
        self
    }
}

/// Completed scan cached until the next daily reset boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub expiry: DateTime<Utc>,
    pub matching: Vec<StockEntry>,
    pub issues: Vec<StockEntry>,
}

impl CacheRecord for CachedResult {
    const VARIANT: CacheVariant = CacheVariant::Result;

    fn is_fresh(&self, now: DateTime<Utc>, _max_age: Duration) -> bool {
        now < self.expiry
    }
}

/// Partial scan state, enough to resume without re-fetching processed tickers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub last_update: DateTime<Utc>,
    pub total: usize,
    pub processed: BTreeSet<String>,
    pub matching: Vec<StockEntry>,
    pub issues: Vec<StockEntry>,
}

impl CacheRecord for ProgressSnapshot {
    const VARIANT: CacheVariant = CacheVariant::Progress;

    fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.last_update) < max_age
    }

    fn normalize(mut self) -> Self {
        self.total = self.total.max(self.processed.len());
        self
    }
}

/// Output of a completed scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub matching: Vec<StockEntry>,
    pub issues: Vec<StockEntry>,
}

impl CacheRecord for FinalResult {
    const VARIANT: CacheVariant = CacheVariant::Final;
    const ATOMIC: bool = true;

    fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.timestamp) < max_age
    }
}

/// Reset boundary on the market-local day after `now`
pub fn next_expiry(now: DateTime<Utc>, tz: Tz, boundary: NaiveTime) -> DateTime<Utc> {
    let local_date = now.with_timezone(&tz).date_naive();

    // Later days only when the boundary falls in a DST gap
    for offset in 1..=3 {
        let date = local_date + Duration::days(offset);
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(boundary)).earliest() {
            return candidate.with_timezone(&Utc);
        }
    }

    now + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 15, 0).unwrap()
    }

    #[test]
    fn expiry_before_market_open_still_waits_for_next_day() {
        // 02:00 UTC is 07:30 IST, so today's 09:15 is ahead but not used
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap();
        let expiry = next_expiry(now, chrono_tz::Asia::Kolkata, boundary());
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 3, 5, 3, 45, 0).unwrap());
    }

    #[test]
    fn expiry_uses_the_market_local_date() {
        // 20:00 UTC on the 4th is already 01:30 IST on the 5th
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 20, 0, 0).unwrap();
        let expiry = next_expiry(now, chrono_tz::Asia::Kolkata, boundary());
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 3, 6, 3, 45, 0).unwrap());
    }

    #[test]
    fn expiry_skips_a_boundary_inside_a_dst_gap() {
        // 02:30 does not exist in New York on 2024-03-10
        let gap = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let expiry = next_expiry(now, chrono_tz::America::New_York, gap);
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 3, 11, 6, 30, 0).unwrap());
    }

    #[test]
    fn expiry_after_market_open_rolls_to_next_day() {
        // 10:00 UTC is 15:30 IST
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let expiry = next_expiry(now, chrono_tz::Asia::Kolkata, boundary());
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 3, 5, 3, 45, 0).unwrap());
    }

    #[test]
    fn snapshot_total_never_undercounts_processed() {
        let snapshot = ProgressSnapshot {
            last_update: Utc::now(),
            total: 1,
            processed: ["A.NS", "B.NS", "C.NS"].iter().map(|s| s.to_string()).collect(),
            matching: vec![],
            issues: vec![],
        }
        .normalize();
        assert_eq!(snapshot.total, 3);
    }

    #[test]
    fn progress_goes_stale_after_max_age() {
        let now = Utc::now();
        let snapshot = ProgressSnapshot {
            last_update: now - Duration::hours(13),
            total: 0,
            processed: BTreeSet::new(),
            matching: vec![],
            issues: vec![],
        };
        assert!(!snapshot.is_fresh(now, Duration::hours(12)));
        assert!(snapshot.is_fresh(now, Duration::hours(14)));
    }
}
