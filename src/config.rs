use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

const DB_PATH_ENV: &str = "SITEWATCH_DB_PATH";

const BIND_ADDR_ENV: &str = "SITEWATCH_BIND_ADDR";

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Notifications older than this are deleted
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

impl StorageConfig {
    pub fn retention_days(&self) -> u32 {
        match self {
            StorageConfig::None => default_retention_days(),
            StorageConfig::Sqlite { retention_days, .. } => *retention_days,
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./sitewatch.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// HTTP surface (optional - disabled when absent)
    pub api: Option<ApiSettings>,
}

/// Scheduling and monitor-policy limits
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often the scheduler looks for due monitors
    pub tick_interval_secs: u64,

    /// Cap on simultaneously running checks across all monitors
    pub max_concurrent_checks: usize,

    /// Floor for a monitor's check interval
    pub min_check_interval_secs: u64,

    pub max_check_interval_secs: u64,

    pub default_check_interval_secs: u64,

    /// A monitor without a successful check for this many intervals is stale
    pub stale_after_intervals: u32,

    pub max_monitors_per_owner: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            max_concurrent_checks: 8,
            min_check_interval_secs: 60,
            max_check_interval_secs: 24 * 60 * 60,
            default_check_interval_secs: 300,
            stale_after_intervals: 3,
            max_monitors_per_owner: 50,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    /// Interval limits must satisfy `1 <= min <= default <= max`
    pub fn validate(&self) -> anyhow::Result<()> {
        let (min, default, max) = (
            self.min_check_interval_secs,
            self.default_check_interval_secs,
            self.max_check_interval_secs,
        );

        if min == 0 {
            anyhow::bail!("scheduler.min_check_interval_secs must be at least 1");
        }
        if min > max {
            anyhow::bail!("scheduler.min_check_interval_secs ({min}) exceeds max_check_interval_secs ({max})");
        }
        if !(min..=max).contains(&default) {
            anyhow::bail!(
                "scheduler.default_check_interval_secs ({default}) must lie within {min}..={max}"
            );
        }
        if self.max_concurrent_checks == 0 {
            anyhow::bail!("scheduler.max_concurrent_checks must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub timeout_secs: u64,

    /// Retries after the first attempt, for timeouts, connection errors and 5xx
    pub max_retries: u32,

    /// Backoff before the first retry, doubled for each following one
    pub retry_backoff_ms: u64,

    pub user_agent: String,

    /// Bodies larger than this are truncated
    pub max_content_length: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 500,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            max_content_length: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Observed values are truncated to this many characters
    pub max_value_chars: usize,

    /// Characters of page text kept after an item-search match
    pub item_context_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_value_chars: 2000,
            item_context_chars: 120,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Events buffered per live connection before it is dropped
    pub connection_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            connection_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Bearer token → owner id
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.scheduler.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

/// Apply environment overrides on top of a parsed config
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let retention_days = config
            .storage
            .as_ref()
            .map_or_else(default_retention_days, StorageConfig::retention_days);
        config.storage = Some(StorageConfig::Sqlite {
            path: PathBuf::from(path),
            retention_days,
        });
    }

    if let Some(addr) = std::env::var(BIND_ADDR_ENV)
        .ok()
        .and_then(|addr| addr.parse().ok())
    {
        match config.api.as_mut() {
            Some(api) => api.bind_addr = addr,
            None => {
                config.api = Some(ApiSettings {
                    bind_addr: addr,
                    enable_cors: default_enable_cors(),
                    tokens: HashMap::new(),
                })
            }
        }
    }

    config
}
