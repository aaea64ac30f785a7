use crate::processor::CoordinatorConfig;
use crate::providers::yahoo::YahooConfig;
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "screener";

/// Runtime settings: built-in defaults, then `screener.toml` if present,
/// then `SCREENER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenerConfig {
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Write a progress snapshot after this many processed tickers
    pub snapshot_every: usize,
    /// Progress and final records older than this are discarded
    pub stale_after_hours: i64,
    pub timezone: String,
    /// Daily `HH:MM` at which cached results expire
    pub reset_boundary: String,
    pub yahoo_base_url: String,
    pub request_timeout_secs: u64,
}

impl ScreenerConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load with an explicit settings file instead of `screener.toml`
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("cache_dir", "stock_cache")?
            .set_default("log_dir", "pattern_logs")?
            .set_default("snapshot_every", 10i64)?
            .set_default("stale_after_hours", 12i64)?
            .set_default("timezone", "Asia/Kolkata")?
            .set_default("reset_boundary", "09:15")?
            .set_default("yahoo_base_url", "https://query1.finance.yahoo.com")?
            .set_default("request_timeout_secs", 20i64)?;

        builder = match file {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let config: Self = builder
            .add_source(Environment::with_prefix("SCREENER"))
            .build()
            .context("Failed to load screener configuration")?
            .try_deserialize()
            .context("Invalid screener configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.snapshot_every == 0 {
            return Err(anyhow!("snapshot_every must be at least 1"));
        }
        if self.stale_after_hours <= 0 {
            return Err(anyhow!("stale_after_hours must be positive"));
        }
        self.tz()?;
        self.boundary()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Unknown time zone '{}': {}", self.timezone, e))
    }

    pub fn boundary(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.reset_boundary, "%H:%M")
            .with_context(|| format!("Invalid reset boundary '{}'", self.reset_boundary))
    }

    pub fn max_age(&self) -> Duration {
        Duration::hours(self.stale_after_hours)
    }

    pub fn coordinator(&self) -> Result<CoordinatorConfig> {
        Ok(CoordinatorConfig {
            snapshot_every: self.snapshot_every,
            timezone: self.tz()?,
            reset_boundary: self.boundary()?,
        })
    }

    pub fn yahoo(&self) -> YahooConfig {
        YahooConfig {
            base_url: self.yahoo_base_url.trim_end_matches('/').to_string(),
            timeout: std::time::Duration::from_secs(self.request_timeout_secs),
            ..YahooConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_settings_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "cache_dir = \"/tmp/screener-cache\"\nsnapshot_every = 25\nreset_boundary = \"08:30\"\n",
        )
        .unwrap();

        let config = ScreenerConfig::load_from(Some(&path)).unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/screener-cache"));
        assert_eq!(config.snapshot_every, 25);
        assert_eq!(config.boundary().unwrap(), NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(config.max_age(), Duration::hours(12));
        assert_eq!(config.tz().unwrap(), chrono_tz::Asia::Kolkata);
    }

    #[test]
    fn invalid_boundary_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "reset_boundary = \"quarter past nine\"\n").unwrap();

        assert!(ScreenerConfig::load_from(Some(&path)).is_err());
    }
}
