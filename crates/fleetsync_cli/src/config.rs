//! Configuration file support for fleetsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Legacy environment variables (`KANDJI_API_TOKEN`, `CLOUDFLARE_LIST_ID`, ...)
//! 3. Environment variables prefixed with `FLEETSYNC_`, with `__` between
//!    nested keys (e.g., `FLEETSYNC_KANDJI__API_URL`)
//! 4. The file passed with `--config` (TOML or YAML, by extension)
//! 5. Local `./fleetsync.toml`
//! 6. Local `./config.yaml` (the layout older deployments ship with)
//! 7. XDG config file (`~/.config/fleetsync/config.toml`)
//! 8. Built-in defaults
//!
//! Example config file:
//! ```toml
//! sync_interval = "5m"
//! on_missing = "ignore"   # ignore | delete | alert
//!
//! [kandji]
//! api_url = "https://acme.api.kandji.io"
//! api_token = "..."        # or KANDJI_API_TOKEN
//! sync_devices_without_owners = false
//! sync_mobile_devices = false
//! include_tags = []
//! exclude_tags = ["retired"]
//!
//! [kandji.blueprints_exclude]
//! blueprint_names = ["Lab"]
//!
//! [cloudflare]
//! api_token = "..."        # or CLOUDFLARE_API_TOKEN
//! account_id = "..."
//! target_list_id = "..."
//! source_list_ids = []
//!
//! [rate_limits]
//! kandji_requests_per_second = 10.0
//! cloudflare_requests_per_second = 4.0
//! burst_capacity = 5
//!
//! [batch]
//! size = 50
//!
//! [log]
//! level = "info"
//! format = "text"          # text | json
//! ```

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, Value};
use directories::ProjectDirs;
use fleetsync::sync::{BlueprintFilter, FilterPolicy, MissingPolicy, SyncOptions};
use fleetsync::{RateBudget, rate_limits};
use serde::Deserialize;
use thiserror::Error;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often the daemon runs a pass.
    #[serde(with = "humantime_serde")]
    pub sync_interval: Duration,
    /// What to do with target items that have no source: ignore, delete or alert.
    pub on_missing: String,
    pub kandji: KandjiConfig,
    pub cloudflare: CloudflareConfig,
    pub rate_limits: RateLimitConfig,
    pub batch: BatchConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            on_missing: MissingPolicy::default().to_string(),
            kandji: KandjiConfig::default(),
            cloudflare: CloudflareConfig::default(),
            rate_limits: RateLimitConfig::default(),
            batch: BatchConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Kandji configuration and device filter settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct KandjiConfig {
    /// Tenant API URL (e.g., "https://acme.api.kandji.io").
    pub api_url: Option<String>,
    /// Can also be set via KANDJI_API_TOKEN.
    pub api_token: Option<String>,
    pub sync_devices_without_owners: bool,
    pub sync_mobile_devices: bool,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub blueprints_include: BlueprintConfig,
    pub blueprints_exclude: BlueprintConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlueprintConfig {
    pub blueprint_ids: Vec<String>,
    pub blueprint_names: Vec<String>,
}

impl From<&BlueprintConfig> for BlueprintFilter {
    fn from(config: &BlueprintConfig) -> Self {
        Self {
            ids: config.blueprint_ids.clone(),
            names: config.blueprint_names.clone(),
        }
    }
}

/// Cloudflare configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudflareConfig {
    /// Can also be set via CLOUDFLARE_API_TOKEN.
    pub api_token: Option<String>,
    pub account_id: Option<String>,
    /// The Gateway list kept in step with Kandji.
    pub target_list_id: Option<String>,
    /// Read-only lists merged into the source set.
    pub source_list_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub kandji_requests_per_second: f64,
    pub cloudflare_requests_per_second: f64,
    pub burst_capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            kandji_requests_per_second: rate_limits::DIRECTORY_DEFAULT_RPS,
            cloudflare_requests_per_second: rate_limits::COLLECTION_DEFAULT_RPS,
            burst_capacity: rate_limits::DEFAULT_BURST,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum identifiers per mutation request.
    pub size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: fleetsync::sync::DEFAULT_BATCH_SIZE.get(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Command-line overrides for configuration values.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct CliOverrides {
    /// How often to run a pass (e.g., 5m, 1h)
    #[arg(long, global = true, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub sync_interval: Option<Duration>,

    /// Action for target items with no source: ignore, delete, alert
    #[arg(long, global = true)]
    pub on_missing: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Kandji API URL
    #[arg(long, global = true)]
    pub kandji_api_url: Option<String>,

    /// Kandji API token
    #[arg(long, global = true)]
    pub kandji_api_token: Option<String>,

    /// Sync devices without an assigned owner
    #[arg(long, global = true)]
    pub sync_devices_without_owners: bool,

    /// Sync iPhone and iPad devices
    #[arg(long, global = true)]
    pub sync_mobile_devices: bool,

    /// Only sync devices carrying one of these tags (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub include_tags: Option<Vec<String>>,

    /// Never sync devices carrying these tags (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub exclude_tags: Option<Vec<String>>,

    /// Only sync devices on these blueprint IDs (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub blueprints_include_ids: Option<Vec<String>>,

    /// Only sync devices on these blueprint names (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub blueprints_include_names: Option<Vec<String>>,

    /// Never sync devices on these blueprint IDs (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub blueprints_exclude_ids: Option<Vec<String>>,

    /// Never sync devices on these blueprint names (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub blueprints_exclude_names: Option<Vec<String>>,

    /// Cloudflare API token
    #[arg(long, global = true)]
    pub cloudflare_api_token: Option<String>,

    /// Cloudflare account ID
    #[arg(long, global = true)]
    pub cloudflare_account_id: Option<String>,

    /// Cloudflare Gateway list to keep in step
    #[arg(long, global = true)]
    pub cloudflare_list_id: Option<String>,

    /// Read-only Gateway lists merged into the source set (comma-separated)
    #[arg(long, global = true, value_delimiter = ',')]
    pub cloudflare_source_list_ids: Option<Vec<String>>,

    /// Kandji API requests per second
    #[arg(long, global = true)]
    pub kandji_requests_per_second: Option<f64>,

    /// Cloudflare API requests per second
    #[arg(long, global = true)]
    pub cloudflare_requests_per_second: Option<f64>,

    /// Burst capacity for both rate limiters
    #[arg(long, global = true)]
    pub burst_capacity: Option<u32>,

    /// Maximum identifiers per mutation request
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,
}

/// Everything a sync command needs, checked.
#[derive(Debug)]
pub struct ValidatedConfig {
    pub kandji_api_url: String,
    pub kandji_api_token: String,
    pub cloudflare_api_token: String,
    pub cloudflare_account_id: String,
    pub options: SyncOptions,
    pub directory_budget: RateBudget,
    pub collection_budget: RateBudget,
    pub sync_interval: Duration,
}

impl Config {
    /// Load configuration from every layer.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut files = Vec::new();
        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            files.push(path);
        }
        for local in ["config.yaml", "fleetsync.toml"] {
            let local = PathBuf::from(local);
            if local.exists() {
                files.push(local);
            }
        }

        Self::layered(
            &files,
            explicit,
            Self::environment(),
            &|key| std::env::var(key).ok(),
        )
    }

    fn environment() -> Environment {
        Environment::with_prefix("FLEETSYNC")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("kandji.include_tags")
            .with_list_parse_key("kandji.exclude_tags")
            .with_list_parse_key("cloudflare.source_list_ids")
    }

    /// Assemble the layers given explicit sources.
    fn layered(
        files: &[PathBuf],
        explicit: Option<&Path>,
        env: Environment,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Format follows the extension.
        for path in files {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        if let Some(path) = explicit {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(env);

        for (key, value) in legacy_env_overrides(lookup) {
            builder = builder.set_override(key, value)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Apply command-line overrides on top of the loaded layers.
    pub fn apply_overrides(&mut self, cli: &CliOverrides) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_some<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        set(&mut self.sync_interval, &cli.sync_interval);
        set(&mut self.on_missing, &cli.on_missing);
        set(&mut self.log.level, &cli.log_level);
        set(&mut self.log.format, &cli.log_format);

        set_some(&mut self.kandji.api_url, &cli.kandji_api_url);
        set_some(&mut self.kandji.api_token, &cli.kandji_api_token);
        if cli.sync_devices_without_owners {
            self.kandji.sync_devices_without_owners = true;
        }
        if cli.sync_mobile_devices {
            self.kandji.sync_mobile_devices = true;
        }
        set(&mut self.kandji.include_tags, &cli.include_tags);
        set(&mut self.kandji.exclude_tags, &cli.exclude_tags);
        set(
            &mut self.kandji.blueprints_include.blueprint_ids,
            &cli.blueprints_include_ids,
        );
        set(
            &mut self.kandji.blueprints_include.blueprint_names,
            &cli.blueprints_include_names,
        );
        set(
            &mut self.kandji.blueprints_exclude.blueprint_ids,
            &cli.blueprints_exclude_ids,
        );
        set(
            &mut self.kandji.blueprints_exclude.blueprint_names,
            &cli.blueprints_exclude_names,
        );

        set_some(&mut self.cloudflare.api_token, &cli.cloudflare_api_token);
        set_some(&mut self.cloudflare.account_id, &cli.cloudflare_account_id);
        set_some(&mut self.cloudflare.target_list_id, &cli.cloudflare_list_id);
        set(
            &mut self.cloudflare.source_list_ids,
            &cli.cloudflare_source_list_ids,
        );

        set(
            &mut self.rate_limits.kandji_requests_per_second,
            &cli.kandji_requests_per_second,
        );
        set(
            &mut self.rate_limits.cloudflare_requests_per_second,
            &cli.cloudflare_requests_per_second,
        );
        set(&mut self.rate_limits.burst_capacity, &cli.burst_capacity);
        set(&mut self.batch.size, &cli.batch_size);
    }

    /// The effective log level, normalized to lowercase.
    pub fn log_level(&self) -> String {
        self.log.level.trim().to_ascii_lowercase()
    }

    /// Check every value and build the engine settings.
    ///
    /// All problems are reported together.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let mut problems = Vec::new();

        let mut required = |value: &Option<String>, name: &str| -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    problems.push(format!("{name} is required"));
                    String::new()
                }
            }
        };
        let kandji_api_url = required(&self.kandji.api_url, "kandji.api_url");
        let kandji_api_token = required(&self.kandji.api_token, "kandji.api_token");
        let cloudflare_api_token = required(&self.cloudflare.api_token, "cloudflare.api_token");
        let cloudflare_account_id = required(&self.cloudflare.account_id, "cloudflare.account_id");
        let target_list_id = required(&self.cloudflare.target_list_id, "cloudflare.target_list_id");

        if !kandji_api_url.is_empty() && url::Url::parse(&kandji_api_url).is_err() {
            problems.push(format!("kandji.api_url is not a valid URL: {kandji_api_url}"));
        }

        let missing_policy = self.on_missing.parse::<MissingPolicy>().unwrap_or_else(|e| {
            problems.push(e.to_string());
            MissingPolicy::default()
        });

        let mut seen = HashSet::new();
        let mut auxiliary_collections = Vec::new();
        for id in self.cloudflare.source_list_ids.iter().map(|s| s.trim()) {
            if id.is_empty() || !seen.insert(id) {
                continue;
            }
            if id == target_list_id {
                problems.push(format!(
                    "cloudflare.source_list_ids must not contain the target list {id}"
                ));
            }
            auxiliary_collections.push(id.to_string());
        }

        let batch_size = NonZeroUsize::new(self.batch.size).unwrap_or_else(|| {
            problems.push("batch.size must be greater than zero".to_string());
            fleetsync::sync::DEFAULT_BATCH_SIZE
        });

        for (name, rate) in [
            (
                "rate_limits.kandji_requests_per_second",
                self.rate_limits.kandji_requests_per_second,
            ),
            (
                "rate_limits.cloudflare_requests_per_second",
                self.rate_limits.cloudflare_requests_per_second,
            ),
        ] {
            if !rate.is_finite() || rate <= 0.0 {
                problems.push(format!("{name} must be a positive number, got {rate}"));
            }
        }
        if self.rate_limits.burst_capacity == 0 {
            problems.push("rate_limits.burst_capacity must be greater than zero".to_string());
        }

        if self.sync_interval.is_zero() {
            problems.push("sync_interval must be greater than zero".to_string());
        }

        let level = self.log_level();
        if !LOG_LEVELS.contains(&level.as_str()) {
            problems.push(format!(
                "log.level must be one of {}, got {:?}",
                LOG_LEVELS.join("|"),
                self.log.level
            ));
        }

        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        let mut options = SyncOptions::new(target_list_id);
        options.auxiliary_collections = auxiliary_collections;
        options.missing_policy = missing_policy;
        options.batch_size = batch_size;
        options.policy = FilterPolicy {
            require_owner: !self.kandji.sync_devices_without_owners,
            include_mobile: self.kandji.sync_mobile_devices,
            include_tags: self.kandji.include_tags.clone(),
            exclude_tags: self.kandji.exclude_tags.clone(),
            blueprints_include: (&self.kandji.blueprints_include).into(),
            blueprints_exclude: (&self.kandji.blueprints_exclude).into(),
        };

        Ok(ValidatedConfig {
            kandji_api_url,
            kandji_api_token,
            cloudflare_api_token,
            cloudflare_account_id,
            options,
            directory_budget: RateBudget::new(
                self.rate_limits.kandji_requests_per_second,
                self.rate_limits.burst_capacity,
            ),
            collection_budget: RateBudget::new(
                self.rate_limits.cloudflare_requests_per_second,
                self.rate_limits.burst_capacity,
            ),
            sync_interval: self.sync_interval,
        })
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "fleetsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Split a comma-separated list, dropping blanks.
fn split_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Overrides from the unprefixed environment variables older deployments use.
fn legacy_env_overrides(lookup: &dyn Fn(&str) -> Option<String>) -> Vec<(&'static str, Value)> {
    const STRINGS: [(&str, &str); 7] = [
        ("KANDJI_API_URL", "kandji.api_url"),
        ("KANDJI_API_TOKEN", "kandji.api_token"),
        ("CLOUDFLARE_API_TOKEN", "cloudflare.api_token"),
        ("CLOUDFLARE_ACCOUNT_ID", "cloudflare.account_id"),
        ("CLOUDFLARE_LIST_ID", "cloudflare.target_list_id"),
        ("ON_MISSING", "on_missing"),
        ("LOG_LEVEL", "log.level"),
    ];
    const FLAGS: [(&str, &str); 2] = [
        ("SYNC_DEVICES_WITHOUT_OWNERS", "kandji.sync_devices_without_owners"),
        ("SYNC_MOBILE_DEVICES", "kandji.sync_mobile_devices"),
    ];

    let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let mut overrides = Vec::new();

    for (name, key) in STRINGS {
        if let Some(value) = present(name) {
            overrides.push((key, Value::from(value)));
        }
    }
    for (name, key) in FLAGS {
        if let Some(value) = present(name) {
            overrides.push((key, Value::from(parse_bool(&value))));
        }
    }
    if let Some(value) = present("CLOUDFLARE_SOURCE_LIST_IDS") {
        overrides.push((
            "cloudflare.source_list_ids",
            Value::from(split_comma_list(&value)),
        ));
    }

    overrides
}
