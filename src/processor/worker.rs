use crate::cache::{
    next_expiry, CacheRecord, CacheStore, CacheVariant, CachedResult, FinalResult, ProgressSnapshot,
};
use crate::diagnostics::{DiagnosticsLogger, ScanCounter};
use crate::indicators::patterns::PatternRecognizer;
use crate::models::{PriceSeries, StockEntry};
use crate::processor::job::{ScanKey, ScanRequest};
use crate::processor::session::{ScanSession, ScanState, SharedSession, StopSignal};
use crate::providers::{CompanyNameResolver, FetchedSeries, PriceSource, TickerUniverse};
use crate::utils::format_duration;
use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no tickers available for {0}")]
    EmptyUniverse(ScanKey),
}

// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub snapshot_every: usize,
    pub timezone: Tz,
    pub reset_boundary: NaiveTime,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            snapshot_every: 10,
            timezone: chrono_tz::Asia::Kolkata,
            reset_boundary: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
        }
    }
}

/// Where the results of a scan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Live,
    CachedResult,
    FinalResult,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub key: ScanKey,
    pub state: ScanState,
    pub source: ResultSource,
    /// Universe size; unknown when served from the cached result
    pub total: Option<usize>,
    pub processed: usize,
    pub matching: Vec<StockEntry>,
    pub issues: Vec<StockEntry>,
    /// Counters of the live run; None when served from the cache
    pub counter: Option<ScanCounter>,
}

impl ScanOutcome {
    fn from_session(session: &ScanSession, source: ResultSource, counter: Option<ScanCounter>) -> Self {
        Self {
            key: session.key.clone(),
            state: session.state,
            source,
            total: Some(session.total),
            processed: session.processed.len(),
            matching: session.matching.clone(),
            issues: session.issues.clone(),
            counter,
        }
    }
}

/// Drives a scan: fetch, classify and accumulate each ticker, with progress
/// snapshots so an interrupted scan picks up where it left off
pub struct ScanCoordinator<U, P, N> {
    universe: U,
    prices: P,
    names: N,
    cache: Arc<CacheStore>,
    log_dir: PathBuf,
    recognizer: PatternRecognizer,
    config: CoordinatorConfig,
}

impl<U, P, N> ScanCoordinator<U, P, N>
where
    U: TickerUniverse,
    P: PriceSource,
    N: CompanyNameResolver,
{
    pub fn new(universe: U, prices: P, names: N, cache: CacheStore, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            universe,
            prices,
            names,
            cache: Arc::new(cache),
            log_dir: log_dir.into(),
            recognizer: PatternRecognizer::default(),
            config: CoordinatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_recognizer(mut self, recognizer: PatternRecognizer) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub async fn logger(&self, key: &ScanKey) -> DiagnosticsLogger {
        DiagnosticsLogger::open(&self.log_dir, key).await
    }

    #[instrument(skip(self, stop, session), fields(scan = %request.key.cache_key()))]
    pub async fn run(
        &self,
        request: &ScanRequest,
        stop: &StopSignal,
        session: &SharedSession,
    ) -> Result<ScanOutcome, ScanError> {
        let key = &request.key;
        {
            let mut s = session.write();
            *s = ScanSession::new(key.clone());
        }

        if let Some(outcome) = self.completed_from_cache(key, session).await {
            return Ok(outcome);
        }

        let tickers = self.universe.list_tickers(key.exchange).await;
        if tickers.is_empty() {
            error!("Ticker universe for {} is empty, aborting scan", key.exchange);
            session.write().state = ScanState::Idle;
            return Err(ScanError::EmptyUniverse(key.clone()));
        }

        let mut logger = self.logger(key).await;
        let snapshot = if request.fresh {
            self.remove(key, CacheVariant::Progress).await;
            None
        } else {
            self.load::<ProgressSnapshot>(key).await
        };

        match snapshot {
            Some(snapshot) => {
                info!(
                    "Resuming {}: {} of {} tickers already processed",
                    key,
                    snapshot.processed.len(),
                    snapshot.total
                );
                session.write().restore(snapshot);
            }
            None => {
                info!("Starting scan {} over {} tickers", key, tickers.len());
                logger.start_fresh().await;
            }
        }
        session.write().begin(tickers.len(), Utc::now());

        let snapshot_every = self.config.snapshot_every.max(1);

        for ticker in &tickers {
            if stop.is_requested() {
                self.save_progress(key, &logger, session).await;
                let mut s = session.write();
                s.state = ScanState::Stopped;
                info!(
                    "Scan {} stopped after {} of {} tickers",
                    key,
                    s.processed.len(),
                    s.total
                );
                return Ok(ScanOutcome::from_session(&s, ResultSource::Live, Some(logger.counter())));
            }

            if session.read().is_processed(ticker) {
                continue;
            }

            self.process_ticker(key, ticker, &mut logger, session).await;

            let processed_since_start = session.read().processed_since_start;
            if processed_since_start % snapshot_every == 0 {
                self.save_progress(key, &logger, session).await;
                let s = session.read();
                let eta = s
                    .eta(Utc::now())
                    .map(|eta| format_duration(&eta))
                    .unwrap_or_else(|| "unknown".to_string());
                info!(
                    "Progress {}/{} ({} matches), ETA {}",
                    s.processed.len(),
                    s.total,
                    s.matching.len(),
                    eta
                );
            }
        }

        self.complete(key, &logger, session).await;
        let s = session.read();
        Ok(ScanOutcome::from_session(&s, ResultSource::Live, Some(logger.counter())))
    }

    /// Clear the session and every cache record of the key
    pub async fn reset(&self, key: &ScanKey, session: &SharedSession) {
        {
            let mut s = session.write();
            if s.key != *key {
                *s = ScanSession::new(key.clone());
            }
            s.clear();
            s.state = ScanState::Reset;
        }

        for variant in [CacheVariant::Progress, CacheVariant::Final, CacheVariant::Result] {
            if self.remove(key, variant).await {
                debug!("Deleted {} cache for {}", variant, key);
            }
        }

        info!("Scan {} reset", key);
        session.write().state = ScanState::Idle;
    }

    async fn completed_from_cache(&self, key: &ScanKey, session: &SharedSession) -> Option<ScanOutcome> {
        let (matching, issues, total, source) =
            if let Some(cached) = self.load::<CachedResult>(key).await {
                (cached.matching, cached.issues, None, ResultSource::CachedResult)
            } else if let Some(last) = self.load::<FinalResult>(key).await {
                (last.matching, last.issues, Some(last.total), ResultSource::FinalResult)
            } else {
                return None;
            };

        info!(
            "Using {} for {} ({} matches)",
            match source {
                ResultSource::CachedResult => "cached result",
                _ => "final result",
            },
            key,
            matching.len()
        );

        let mut s = session.write();
        s.matching = matching;
        s.issues = issues;
        s.total = total.unwrap_or_default();
        s.state = ScanState::Completed;
        let mut outcome = ScanOutcome::from_session(&s, source, None);
        outcome.total = total;
        Some(outcome)
    }

    async fn process_ticker(
        &self,
        key: &ScanKey,
        ticker: &str,
        logger: &mut DiagnosticsLogger,
        session: &SharedSession,
    ) {
        let fetched = match self.prices.fetch(ticker, &key.interval).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Failed to fetch {}: {}", ticker, e);
                FetchedSeries {
                    series: PriceSeries::new(ticker.to_string(), key.interval.clone()),
                    degraded: false,
                }
            }
        };

        let mut matched = false;
        if fetched.series.is_empty() {
            debug!("No data for {}, skipping", ticker);
        } else {
            let evaluation = self.recognizer.evaluate(key.pattern, &fetched.series, ticker);
            logger.record(ticker, &evaluation).await;
            matched = evaluation.is_match();
        }

        if matched || fetched.degraded {
            let name = self.names.resolve(ticker).await;
            let entry = StockEntry::new(ticker, name, fetched.series);

            let mut s = session.write();
            if matched {
                info!("{} matches {}", ticker, key.pattern);
                s.matching.push(entry.clone());
            }
            if fetched.degraded {
                s.issues.push(entry);
            }
        }

        session.write().mark_processed(ticker);
    }

    // Snapshot and counter are saved together so a resume sees matching totals
    async fn save_progress(&self, key: &ScanKey, logger: &DiagnosticsLogger, session: &SharedSession) {
        let snapshot = session.read().snapshot(Utc::now());
        self.persist(key, snapshot).await;
        logger.save_counter().await;
    }

    async fn complete(&self, key: &ScanKey, logger: &DiagnosticsLogger, session: &SharedSession) {
        let now = Utc::now();
        let (last, cached) = {
            let s = session.read();
            let last = FinalResult {
                timestamp: now,
                total: s.total,
                matching: s.matching.clone(),
                issues: s.issues.clone(),
            };
            let cached = CachedResult {
                expiry: next_expiry(now, self.config.timezone, self.config.reset_boundary),
                matching: s.matching.clone(),
                issues: s.issues.clone(),
            };
            (last, cached)
        };

        self.persist(key, last).await;
        self.persist(key, cached).await;
        self.remove(key, CacheVariant::Progress).await;
        logger.save_counter().await;
        logger.write_summary().await;

        let mut s = session.write();
        s.state = ScanState::Completed;
        info!(
            "Scan {} completed: {} matches, {} issues out of {} tickers",
            key,
            s.matching.len(),
            s.issues.len(),
            s.total
        );
    }

    async fn load<T>(&self, key: &ScanKey) -> Option<T>
    where
        T: CacheRecord + DeserializeOwned + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let owned = key.clone();
        match task::spawn_blocking(move || cache.read::<T>(&owned)).await {
            Ok(record) => record,
            Err(e) => {
                error!("Reading {} cache for {} did not finish: {}", T::VARIANT, key, e);
                None
            }
        }
    }

    async fn persist<T>(&self, key: &ScanKey, record: T)
    where
        T: CacheRecord + Serialize + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let owned = key.clone();
        match task::spawn_blocking(move || cache.write(&owned, &record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to write {} cache for {}: {}", T::VARIANT, key, e),
            Err(e) => error!("Writing {} cache for {} did not finish: {}", T::VARIANT, key, e),
        }
    }

    async fn remove(&self, key: &ScanKey, variant: CacheVariant) -> bool {
        let cache = Arc::clone(&self.cache);
        let owned = key.clone();
        task::spawn_blocking(move || cache.delete(&owned, variant))
            .await
            .unwrap_or_else(|e| {
                error!("Deleting {} cache for {} did not finish: {}", variant, key, e);
                false
            })
    }
}
