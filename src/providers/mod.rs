//! Collaborator contracts for market data.
//!
//! The scan coordinator only talks to these traits; [`yahoo::YahooFinance`]
//! is the bundled implementation.

pub mod yahoo;

use crate::models::PriceSeries;
use crate::processor::job::Exchange;
use async_trait::async_trait;
use thiserror::Error;

pub use yahoo::YahooFinance;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("no data for {0}")]
    NoData(String),
}

/// A price series plus whether a fallback period/resolution had to be used
#[derive(Debug, Clone)]
pub struct FetchedSeries {
    pub series: PriceSeries,
    pub degraded: bool,
}

#[async_trait]
pub trait TickerUniverse: Send + Sync {
    /// Symbols to scan. An empty list means the universe could not be loaded.
    async fn list_tickers(&self, exchange: Exchange) -> Vec<String>;
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, ticker: &str, interval: &str) -> Result<FetchedSeries, ProviderError>;
}

#[async_trait]
pub trait CompanyNameResolver: Send + Sync {
    /// Best-effort display name; falls back to the bare ticker
    async fn resolve(&self, ticker: &str) -> String;
}

/// Ticker without its exchange suffix, e.g. `RELIANCE.NS` -> `RELIANCE`
pub fn bare_symbol(ticker: &str) -> &str {
    ticker
        .strip_suffix(".NS")
        .or_else(|| ticker.strip_suffix(".BO"))
        .unwrap_or(ticker)
}
