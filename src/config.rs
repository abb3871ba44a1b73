use crate::cli::Cli;
use crate::error::{MirrorError, MirrorResult};
use crate::fab::leaderboard::Country;
use crate::mirror::refresh::PageDepths;
use crate::scheduler::WatchConfig;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::Level;

const TRACE_LEVELS: [&'static str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
const ENV_PREFIX: &str = "MIRROR_";
// a single page or sample never waits through more retries than this
const MAX_FETCH_RETRIES: u32 = 10;

// Settings are read once at startup and handed to the constructors that need
// them. Any setting may be overridden via environment variables. Example:
// MIRROR_PROBE_SAMPLE_SIZE=20 would set probe_sample_size to 20.
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_trace_level")]
    trace_level: String,
    #[serde(alias = "redisURL")]
    pub cache_url: String,
    pub countries: Vec<Country>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_leaderboard_path")]
    pub leaderboard_path: String,
    // `mode` parameter of the name search used for live ranks
    #[serde(default = "default_ranking_mode")]
    pub ranking_mode: String,
    #[serde(default = "default_http_timeout_sec")]
    pub http_timeout_sec: u64,
    #[serde(default = "default_fetch_max_retries")]
    pub fetch_max_retries: u32,
    #[serde(default = "default_fetch_retry_backoff_ms")]
    pub fetch_retry_backoff_ms: u64,
    #[serde(default = "default_refresh_interval_sec")]
    pub refresh_interval_sec: u64,
    #[serde(default = "default_page_depth")]
    pub default_page_depth: u32,
    #[serde(default = "default_page_depth_overrides")]
    pub page_depth_overrides: HashMap<Country, u32>,
    #[serde(default = "default_probe_country")]
    pub probe_country: Country,
    #[serde(default = "default_probe_sample_size")]
    pub probe_sample_size: usize,
}

impl Settings {
    /// Configuration file, then environment, then command line flags.
    pub fn load(cli: &Cli) -> MirrorResult<Self> {
        if !cli.config.is_file() {
            return Err(MirrorError::Config(format!(
                "Unable to read configuration file '{}'",
                cli.config.display()
            )));
        }
        let figment = Figment::new()
            .merge(Yaml::file(&cli.config))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(cli));
        Settings::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> MirrorResult<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> MirrorResult<()> {
        if self.cache_url.trim().is_empty() {
            return Err(MirrorError::Config("cache_url must not be empty".to_string()));
        }
        if self.countries.is_empty() {
            return Err(MirrorError::Config(
                "at least one country must be configured".to_string(),
            ));
        }
        if let Some(country) = self.countries.iter().find(|c| c.as_str().is_empty()) {
            return Err(MirrorError::Config(format!(
                "invalid country code '{}'",
                country
            )));
        }
        if !self.countries.contains(&self.probe_country) {
            return Err(MirrorError::Config(format!(
                "probe_country '{}' is not one of the configured countries",
                self.probe_country
            )));
        }
        if self.default_page_depth == 0 || self.page_depth_overrides.values().any(|d| *d == 0) {
            return Err(MirrorError::Config("page depths must be positive".to_string()));
        }
        if self.probe_sample_size == 0 {
            return Err(MirrorError::Config(
                "probe_sample_size must be positive".to_string(),
            ));
        }
        if self.fetch_max_retries > MAX_FETCH_RETRIES {
            return Err(MirrorError::Config(format!(
                "fetch_max_retries must be at most {}",
                MAX_FETCH_RETRIES
            )));
        }
        if self.refresh_interval_sec == 0 {
            return Err(MirrorError::Config(
                "refresh_interval_sec must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn get_trace_level(&self) -> Level {
        get_trace_level(&self.trace_level)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_sec)
    }

    pub fn fetch_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_backoff_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_sec)
    }

    pub fn page_depths(&self) -> PageDepths {
        PageDepths::new(self.default_page_depth, self.page_depth_overrides.clone())
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            countries: self.countries.clone(),
            probe_country: self.probe_country.clone(),
            sample_size: self.probe_sample_size,
        }
    }
}

fn get_trace_level(level_str: &str) -> Level {
    match level_str.to_uppercase().as_str() {
        level if level == TRACE_LEVELS[0] => Level::TRACE,
        level if level == TRACE_LEVELS[1] => Level::DEBUG,
        level if level == TRACE_LEVELS[2] => Level::INFO,
        level if level == TRACE_LEVELS[3] => Level::WARN,
        level if level == TRACE_LEVELS[4] => Level::ERROR,
        // Default trace level
        _ => Level::INFO,
    }
}

fn default_trace_level() -> String {
    "INFO".to_string()
}

fn default_base_url() -> String {
    "https://fabtcg.com".to_string()
}

fn default_leaderboard_path() -> String {
    "/leaderboards/".to_string()
}

fn default_ranking_mode() -> String {
    "xp90".to_string()
}

fn default_http_timeout_sec() -> u64 {
    5
}

fn default_fetch_max_retries() -> u32 {
    2
}

fn default_fetch_retry_backoff_ms() -> u64 {
    500
}

fn default_refresh_interval_sec() -> u64 {
    3600
}

fn default_page_depth() -> u32 {
    3
}

// The US leaderboard is mirrored down to its top 600
fn default_page_depth_overrides() -> HashMap<Country, u32> {
    HashMap::from([(Country::from("US"), 12)])
}

fn default_probe_country() -> Country {
    Country::from("GB")
}

fn default_probe_sample_size() -> usize {
    10
}
