use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV sample as delivered by a data source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Column-oriented price history for one ticker, ordered by `open_time`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub interval: String,
    pub open_time: Vec<DateTime<Utc>>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl PriceSeries {
    pub fn new(symbol: String, interval: String) -> Self {
        Self {
            symbol,
            interval,
            ..Default::default()
        }
    }

    /// Build a series from bars in any order. Bars are sorted by timestamp and
    /// later duplicates of the same timestamp are dropped.
    pub fn from_bars(symbol: &str, interval: &str, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);

        let mut series = Self::new(symbol.to_string(), interval.to_string());
        for bar in bars {
            series.push(bar);
        }
        series
    }

    fn push(&mut self, bar: Bar) {
        self.open_time.push(bar.timestamp);
        self.open.push(bar.open);
        self.high.push(bar.high);
        self.low.push(bar.low);
        self.close.push(bar.close);
        self.volume.push(bar.volume);
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Borrow the whole series as a window
    pub fn window(&self) -> SeriesWindow<'_> {
        SeriesWindow {
            open_time: &self.open_time,
            open: &self.open,
            high: &self.high,
            low: &self.low,
            close: &self.close,
            volume: &self.volume,
        }
    }

    /// Borrow the trailing `n` bars (or the whole series if shorter)
    pub fn tail(&self, n: usize) -> SeriesWindow<'_> {
        let start = self.len().saturating_sub(n);
        self.window().slice(start, self.len())
    }

    pub fn last_close(&self) -> Option<f64> {
        self.close.last().copied()
    }
}

/// Borrowed view over a contiguous range of a [`PriceSeries`]
#[derive(Debug, Clone, Copy)]
pub struct SeriesWindow<'a> {
    pub open_time: &'a [DateTime<Utc>],
    pub open: &'a [f64],
    pub high: &'a [f64],
    pub low: &'a [f64],
    pub close: &'a [f64],
    pub volume: &'a [f64],
}

impl<'a> SeriesWindow<'a> {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Sub-window `[start, end)`, clamped to the window bounds
    pub fn slice(&self, start: usize, end: usize) -> SeriesWindow<'a> {
        let end = end.min(self.len());
        let start = start.min(end);
        SeriesWindow {
            open_time: &self.open_time[start..end],
            open: &self.open[start..end],
            high: &self.high[start..end],
            low: &self.low[start..end],
            close: &self.close[start..end],
            volume: &self.volume[start..end],
        }
    }

    /// Trailing `n` bars of this window
    pub fn tail(&self, n: usize) -> SeriesWindow<'a> {
        self.slice(self.len().saturating_sub(n), self.len())
    }
}

/// A ticker carried in scan results: matches and degraded fetches alike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    pub ticker: String,
    pub company_name: String,
    pub data: PriceSeries,
}

impl StockEntry {
    pub fn new(ticker: &str, company_name: String, data: PriceSeries) -> Self {
        Self {
            ticker: ticker.to_string(),
            company_name,
            data,
        }
    }
}
