use crate::cache::{CacheStore, CachedResult, FinalResult, ProgressSnapshot};
use crate::config::ScreenerConfig;
use crate::diagnostics::{DiagnosticsLogger, SummaryReport};
use crate::indicators::patterns::{PatternKind, PatternRecognizer};
use crate::models::StockEntry;
use crate::processor::{
    Exchange, ResultSource, ScanCoordinator, ScanKey, ScanOutcome, ScanRequest, ScanSession,
    StopSignal,
};
use crate::providers::{PriceSource, YahooFinance};
use crate::utils::{format_local, truncate_string};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "pattern-screener")]
#[command(about = "Chart-pattern stock screener", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Identifies a scan on the command line
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Pattern to scan for
    #[arg(short, long, value_enum)]
    pub pattern: PatternKind,

    /// Bar interval (e.g., "1d", "1h", "15m")
    #[arg(short, long, default_value = "1d")]
    pub interval: String,

    /// Ticker universe
    #[arg(short, long, value_enum, default_value = "NSE")]
    pub exchange: Exchange,
}

impl ScanArgs {
    pub fn key(&self) -> ScanKey {
        ScanKey::new(self.pattern, &self.interval, self.exchange)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the ticker universe, resuming an interrupted scan if one exists.
    /// Ctrl-C stops the scan and saves progress.
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Discard saved progress and start over
        #[arg(long)]
        fresh: bool,
    },

    /// Delete saved progress and results for a scan
    Reset {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Print stored results or progress for a scan
    Show {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Evaluate a single ticker and print every condition
    Evaluate {
        /// Ticker symbol (e.g., "RELIANCE.NS")
        ticker: String,

        #[arg(short, long, value_enum)]
        pattern: PatternKind,

        #[arg(short, long, default_value = "1d")]
        interval: String,
    },

    /// Rebuild the condition summary from the scan's log
    Summary {
        #[command(flatten)]
        scan: ScanArgs,
    },
}

fn open_cache(config: &ScreenerConfig) -> Result<CacheStore> {
    CacheStore::open(config.cache_dir.clone(), config.max_age())
        .with_context(|| format!("Failed to open cache at {}", config.cache_dir.display()))
}

fn coordinator(config: &ScreenerConfig) -> Result<ScanCoordinator<YahooFinance, YahooFinance, YahooFinance>> {
    let yahoo = || YahooFinance::new(config.yahoo()).context("Failed to build HTTP client");

    Ok(ScanCoordinator::new(yahoo()?, yahoo()?, yahoo()?, open_cache(config)?, config.log_dir.clone())
        .with_config(config.coordinator()?))
}

/// Execute a command from the CLI
pub async fn execute_command(command: Commands, config: &ScreenerConfig, stop: StopSignal) -> Result<()> {
    match command {
        Commands::Scan { scan, fresh } => {
            let mut request = ScanRequest::new(scan.key());
            if fresh {
                request = request.fresh();
            }

            let coordinator = coordinator(config)?;
            let session = ScanSession::shared(request.key.clone());
            let outcome = coordinator.run(&request, &stop, &session).await?;

            print_outcome(&outcome, config);
        }

        Commands::Reset { scan } => {
            let key = scan.key();
            let coordinator = coordinator(config)?;
            coordinator.reset(&key, &ScanSession::shared(key.clone())).await;
            println!("Reset {}", key);
        }

        Commands::Show { scan } => {
            let key = scan.key();
            let cache = open_cache(config)?;

            if let Some(cached) = cache.read::<CachedResult>(&key) {
                println!(
                    "{}: cached result, valid until {}",
                    key,
                    format_local(&cached.expiry, config.tz()?)
                );
                print_entries("Matching", &cached.matching);
                print_entries("Issues", &cached.issues);
            } else if let Some(last) = cache.read::<FinalResult>(&key) {
                println!(
                    "{}: final result from {} ({} tickers)",
                    key,
                    format_local(&last.timestamp, config.tz()?),
                    last.total
                );
                print_entries("Matching", &last.matching);
                print_entries("Issues", &last.issues);
            } else if let Some(progress) = cache.read::<ProgressSnapshot>(&key) {
                println!(
                    "{}: in progress, {} of {} tickers processed (saved {})",
                    key,
                    progress.processed.len(),
                    progress.total,
                    format_local(&progress.last_update, config.tz()?)
                );
                print_entries("Matching so far", &progress.matching);
            } else {
                println!("No saved results for {}", key);
            }
        }

        Commands::Evaluate {
            ticker,
            pattern,
            interval,
        } => {
            let yahoo = YahooFinance::new(config.yahoo())?;
            let fetched = yahoo
                .fetch(&ticker, &interval)
                .await
                .with_context(|| format!("Failed to fetch {}", ticker))?;

            if fetched.degraded {
                println!("No {} data for {}, using daily bars", interval, ticker);
            }

            let evaluation = PatternRecognizer::default().evaluate(pattern, &fetched.series, &ticker);
            println!("{} on {} ({} bars): {}", pattern, ticker, fetched.series.len(), evaluation.outcome);

            if let Some(conditions) = &evaluation.conditions {
                for condition in pattern.conditions() {
                    let mark = match conditions.get(*condition) {
                        Some(true) => "pass",
                        Some(false) => "FAIL",
                        None => "-",
                    };
                    println!("  [{}] {:<26} {}", mark, condition.as_str(), condition.description());
                }
            }
        }

        Commands::Summary { scan } => {
            let key = scan.key();
            if key.pattern.conditions().is_empty() {
                println!("{} has no sub-conditions to summarize", key.pattern);
                return Ok(());
            }

            let logger = DiagnosticsLogger::open(&config.log_dir, &key).await;
            let entries = logger.read_entries().await;
            info!("Read {} condition log entries from {}", entries.len(), logger.log_path().display());

            let report = SummaryReport::from_entries(key.pattern, &entries);
            print!("{}", report.render(&logger.counter()));
            if let Some(path) = logger.write_summary().await {
                println!("\nSummary written to {}", path.display());
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &ScanOutcome, config: &ScreenerConfig) {
    match outcome.source {
        ResultSource::CachedResult => println!("{}: served from cached result", outcome.key),
        ResultSource::FinalResult => println!("{}: served from last final result", outcome.key),
        ResultSource::Live => println!(
            "{}: {:?}, {} of {} tickers processed",
            outcome.key,
            outcome.state,
            outcome.processed,
            outcome.total.unwrap_or(outcome.processed)
        ),
    }

    if let Some(counter) = outcome.counter {
        println!(
            "Evaluated {} ({} logged, {} errors)",
            counter.evaluated, counter.logged, counter.errors
        );
    }

    print_entries("Matching", &outcome.matching);
    print_entries("Issues", &outcome.issues);

    let remaining = outcome
        .total
        .map_or(0, |total| total.saturating_sub(outcome.processed));
    if remaining > 0 && outcome.source == ResultSource::Live {
        println!(
            "\n{} tickers remaining; run the same scan again to resume (cache: {})",
            remaining,
            config.cache_dir.display()
        );
    }
}

fn print_entries(title: &str, entries: &[StockEntry]) {
    println!("\n{} ({}):", title, entries.len());
    if entries.is_empty() {
        return;
    }

    println!("{:<16} | {:<30} | {:>10} | {:>5}", "Ticker", "Company", "Last", "Bars");
    println!("{:-<16}-+-{:-<30}-+-{:->10}-+-{:->5}", "", "", "", "");
    for entry in entries {
        let last = entry
            .data
            .last_close()
            .map(|close| format!("{:.2}", close))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} | {:<30} | {:>10} | {:>5}",
            entry.ticker,
            truncate_string(&entry.company_name, 27),
            last,
            entry.data.len()
        );
    }
}
