use crate::models::{Bar, PriceSeries};
use crate::processor::job::Exchange;
use crate::providers::{
    bare_symbol, CompanyNameResolver, FetchedSeries, PriceSource, ProviderError, TickerUniverse,
};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const SCREENER_ID: &str = "all_stocks_with_earnings_estimates";
const SCREENER_COUNT: usize = 250;
const MIN_SCREENER_TICKERS: usize = 100;
const INDEX_SYMBOLS: [&str; 3] = ["NIFTY", "SENSEX", "BANKNIFTY"];

/// Mid-cap NSE names scanned when the screener answers but lists nothing
/// and no equity list is available
const FALLBACK_TICKERS: [&str; 41] = [
    "ZOMATO.NS", "NYKAA.NS", "PAYTM.NS", "DELHIVERY.NS",
    "PERSISTENT.NS", "LTTS.NS", "COFORGE.NS", "HAPPSTMNDS.NS",
    "ALKEM.NS", "TORNTPHARM.NS", "AUROPHARMA.NS", "BIOCON.NS",
    "DIXON.NS", "AMBER.NS", "POLYCAB.NS", "VGUARD.NS", "BLUESTARCO.NS",
    "MUTHOOTFIN.NS", "CHOLAFIN.NS", "MANAPPURAM.NS", "MASFIN.NS",
    "CLEAN.NS", "DEEPAKFERT.NS", "AARTIIND.NS", "ALKYLAMINE.NS", "GALAXYSURF.NS",
    "VSTIND.NS", "RADICO.NS", "METROPOLIS.NS", "RELAXO.NS",
    "OBEROIRLTY.NS", "PRESTIGE.NS", "BRIGADE.NS", "SOBHA.NS",
    "TATAPOWER.NS", "TORNTPOWER.NS",
    "LXCHEM.NS", "KIMS.NS", "CAMPUS.NS", "MEDPLUS.NS", "LATENTVIEW.NS",
];

/// Range requested when the primary resolution comes back empty
const FALLBACK_INTERVAL: &str = "1d";
const FALLBACK_RANGE: &str = "2y";

#[derive(Debug, Clone)]
pub struct YahooConfig {
    pub base_url: String,
    pub nse_equity_list_urls: Vec<String>,
    pub timeout: Duration,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            nse_equity_list_urls: vec![
                "https://archives.nseindia.com/content/equities/EQUITY_L.csv".to_string(),
                "https://www1.nseindia.com/content/equities/EQUITY_L.csv".to_string(),
            ],
            timeout: Duration::from_secs(20),
        }
    }
}

/// Yahoo Finance chart/search APIs plus the NSE equity list
pub struct YahooFinance {
    client: Client,
    config: YahooConfig,
}

impl YahooFinance {
    pub fn new(config: YahooConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    // History range that yields at least a few hundred bars per interval
    fn range_for(interval: &str) -> &'static str {
        match interval {
            "1m" | "2m" | "5m" => "5d",
            "15m" | "30m" => "1mo",
            "60m" | "90m" | "1h" => "3mo",
            "1d" => "1y",
            _ => "5y",
        }
    }

    async fn fetch_chart(
        &self,
        ticker: &str,
        interval: &str,
        range: &str,
    ) -> Result<PriceSeries, ProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.config.base_url, ticker);
        let response = self
            .client
            .get(&url)
            .query(&[("interval", interval), ("range", range)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return Err(ProviderError::Api(format!("{}: {}", status, body)));
        }

        let chart = response.json::<ChartResponse>().await?;
        let series = chart.into_series(ticker, interval);
        if series.is_empty() {
            return Err(ProviderError::NoData(ticker.to_string()));
        }
        Ok(series)
    }

    async fn screener_tickers(&self, exchange: Exchange) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/v1/finance/screener/predefined/saved", self.config.base_url);
        let count = SCREENER_COUNT.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("formatted", "true"),
                ("lang", "en-US"),
                ("region", "IN"),
                ("scrIds", SCREENER_ID),
                ("count", count.as_str()),
            ])
            .send()
            .await?
            .json::<ScreenerResponse>()
            .await?;

        let symbols = response
            .finance
            .result
            .into_iter()
            .next()
            .map(|r| r.quotes)
            .unwrap_or_default()
            .into_iter()
            .map(|q| q.symbol);

        Ok(filter_exchange(symbols, exchange))
    }

    async fn search(&self, ticker: &str) -> Result<SearchResponse, ProviderError> {
        let url = format!("{}/v1/finance/search", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", ticker), ("quotesCount", "1"), ("newsCount", "0")])
            .send()
            .await?
            .json::<SearchResponse>()
            .await?;
        Ok(response)
    }

    async fn nse_equity_list(&self) -> Vec<String> {
        for url in &self.config.nse_equity_list_urls {
            let body = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => response.text().await,
                Ok(response) => {
                    debug!("NSE list {} returned {}", url, response.status());
                    continue;
                }
                Err(e) => Err(e),
            };

            match body {
                Ok(csv) => {
                    let tickers = parse_equity_list(&csv);
                    if !tickers.is_empty() {
                        return tickers;
                    }
                }
                Err(e) => debug!("NSE list {} failed: {}", url, e),
            }
        }

        Vec::new()
    }
}

#[async_trait]
impl TickerUniverse for YahooFinance {
    async fn list_tickers(&self, exchange: Exchange) -> Vec<String> {
        let screener = match self.screener_tickers(exchange).await {
            Ok(tickers) => Some(tickers),
            Err(e) => {
                warn!("Failed to fetch stock list from screener: {}", e);
                None
            }
        };

        let wants_equity_list = exchange == Exchange::Nse
            && screener
                .as_ref()
                .map_or(true, |tickers| tickers.len() < MIN_SCREENER_TICKERS);
        let equity_list = if wants_equity_list {
            self.nse_equity_list().await
        } else {
            Vec::new()
        };

        choose_universe(screener, equity_list, exchange)
    }
}

/// Pick the scan universe from the screener result (None when the request
/// failed) and the NSE equity list
fn choose_universe(screener: Option<Vec<String>>, equity_list: Vec<String>, exchange: Exchange) -> Vec<String> {
    let Some(tickers) = screener else {
        return equity_list;
    };

    if tickers.len() < MIN_SCREENER_TICKERS && exchange == Exchange::Nse && !equity_list.is_empty() {
        info!("Using NSE equity list ({} symbols)", equity_list.len());
        return equity_list;
    }

    if tickers.is_empty() {
        info!("Screener listed no symbols, using {} fallback tickers", FALLBACK_TICKERS.len());
        return FALLBACK_TICKERS.iter().map(|s| s.to_string()).collect();
    }

    tickers
}

#[async_trait]
impl PriceSource for YahooFinance {
    async fn fetch(&self, ticker: &str, interval: &str) -> Result<FetchedSeries, ProviderError> {
        match self.fetch_chart(ticker, interval, Self::range_for(interval)).await {
            Ok(series) => Ok(FetchedSeries {
                series,
                degraded: false,
            }),
            Err(ProviderError::NoData(_)) => {
                debug!(
                    "No {} data for {}, falling back to {} bars",
                    interval, ticker, FALLBACK_INTERVAL
                );
                let series = self
                    .fetch_chart(ticker, FALLBACK_INTERVAL, FALLBACK_RANGE)
                    .await?;
                Ok(FetchedSeries {
                    series,
                    degraded: true,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CompanyNameResolver for YahooFinance {
    async fn resolve(&self, ticker: &str) -> String {
        match self.search(ticker).await {
            Ok(search) => search
                .quotes
                .into_iter()
                .find(|q| q.symbol.eq_ignore_ascii_case(ticker))
                .and_then(|q| q.longname.or(q.shortname))
                .unwrap_or_else(|| bare_symbol(ticker).to_string()),
            Err(e) => {
                debug!("Company name lookup failed for {}: {}", ticker, e);
                bare_symbol(ticker).to_string()
            }
        }
    }
}

fn filter_exchange(symbols: impl Iterator<Item = String>, exchange: Exchange) -> Vec<String> {
    symbols
        .filter(|s| match exchange {
            Exchange::Nse => s.ends_with(".NS") && !INDEX_SYMBOLS.iter().any(|i| s.contains(i)),
            Exchange::All => s.ends_with(".NS") || s.ends_with(".BO"),
        })
        .collect()
}

/// `SYMBOL` column of the NSE `EQUITY_L.csv` as Yahoo tickers
fn parse_equity_list(csv: &str) -> Vec<String> {
    let mut lines = csv.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let Some(column) = header
        .split(',')
        .position(|h| h.trim().eq_ignore_ascii_case("SYMBOL"))
    else {
        return Vec::new();
    };

    lines
        .filter_map(|line| line.split(',').nth(column))
        .map(str::trim)
        .filter(|symbol| !symbol.is_empty())
        .map(|symbol| format!("{}.NS", symbol))
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl ChartResponse {
    // Bars with any missing field are dropped; Yahoo pads halted sessions with nulls
    fn into_series(self, ticker: &str, interval: &str) -> PriceSeries {
        let Some(result) = self.chart.result.and_then(|r| r.into_iter().next()) else {
            return PriceSeries::new(ticker.to_string(), interval.to_string());
        };
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

        let field = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();
        let bars = result
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &ts)| {
                Some(Bar {
                    timestamp: DateTime::from_timestamp(ts, 0)?,
                    open: field(&quote.open, i)?,
                    high: field(&quote.high, i)?,
                    low: field(&quote.low, i)?,
                    close: field(&quote.close, i)?,
                    volume: field(&quote.volume, i).unwrap_or(0.0),
                })
            })
            .collect();

        PriceSeries::from_bars(ticker, interval, bars)
    }
}

#[derive(Debug, Deserialize)]
struct ScreenerResponse {
    finance: ScreenerFinance,
}

#[derive(Debug, Deserialize)]
struct ScreenerFinance {
    #[serde(default)]
    result: Vec<ScreenerResult>,
}

#[derive(Debug, Deserialize)]
struct ScreenerResult {
    #[serde(default)]
    quotes: Vec<ScreenerQuote>,
}

#[derive(Debug, Deserialize)]
struct ScreenerQuote {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Debug, Deserialize)]
struct SearchQuote {
    symbol: String,
    longname: Option<String>,
    shortname: Option<String>,
}
