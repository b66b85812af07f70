//! Daemon configuration.
//!
//! Layered with figment: built-in defaults → YAML file → `FLUX_SWEEPER_*`
//! environment variables. A configuration that cannot be read or parsed
//! never stops the process; the defaults are used and the problem is
//! reported through [`LoadedConfig::warnings`].

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::automation::{AutomationSettings, DEFAULT_SETTLE_DELAY, MIN_INTERVAL};
use crate::domain::node::Node;
use crate::logging::LogSettings;

pub const ENV_PREFIX: &str = "FLUX_SWEEPER_";
const APP_DIR: &str = "flux-sweeper";

const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_LOG_HISTORY: usize = 1000;
const DEFAULT_LOG_FILE_MB: u64 = 10;
const MAX_LOG_FILE_MB: u64 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IPs to scan for nodes. A list or a comma-separated string.
    #[serde(deserialize_with = "list_or_csv")]
    pub scan_ips: Vec<String>,
    /// Container names containing any of these are removed.
    #[serde(deserialize_with = "list_or_csv")]
    pub target_app_prefixes: Vec<String>,
    pub automation_interval_secs: u64,
    pub settle_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub debug: bool,
    pub log_file: String,
    pub log_clear_on_start: bool,
    pub max_log_history: usize,
    pub max_log_file_size_mb: u64,
    pub http_addr: String,
    pub log_level: String,
    /// Nodes managed without discovery.
    pub nodes: Vec<Node>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_ips: Vec::new(),
            target_app_prefixes: Vec::new(),
            automation_interval_secs: DEFAULT_INTERVAL_SECS,
            settle_delay_secs: DEFAULT_SETTLE_DELAY.as_secs(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            debug: false,
            log_file: "session.log".to_string(),
            log_clear_on_start: false,
            max_log_history: DEFAULT_LOG_HISTORY,
            max_log_file_size_mb: DEFAULT_LOG_FILE_MB,
            http_addr: "127.0.0.1:9120".to_string(),
            log_level: "info".to_string(),
            nodes: Vec::new(),
        }
    }
}

/// A config plus whatever was wrong with its sources.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join(APP_DIR).join("config.yaml"))
    }

    pub fn automation_interval(&self) -> Duration {
        Duration::from_secs(self.automation_interval_secs).max(MIN_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Valid scan IPs, in configured order.
    pub fn scan_targets(&self) -> Vec<IpAddr> {
        parse_scan_ips(&self.scan_ips).0
    }

    /// Absolute log path. Relative names live in the user's data dir.
    pub fn log_path(&self) -> PathBuf {
        let file = Path::new(&self.log_file);
        if file.is_absolute() {
            return file.to_path_buf();
        }
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(file)
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            debug: self.debug,
            capacity: self.max_log_history,
            file: Some(self.log_path()),
            rotate_bytes: self.max_log_file_size_mb.saturating_mul(1024 * 1024),
            clear_on_start: self.log_clear_on_start,
        }
    }

    pub fn automation_settings(&self) -> AutomationSettings {
        AutomationSettings::new(
            self.automation_interval(),
            Duration::from_secs(self.settle_delay_secs),
            self.target_app_prefixes.clone(),
        )
    }

    /// Clamp out-of-range values. Returns one warning per adjustment.
    fn normalize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.automation_interval_secs < MIN_INTERVAL.as_secs() {
            warnings.push(format!(
                "automation_interval_secs was set below the minimum of {0}s and has been adjusted to {0}s.",
                MIN_INTERVAL.as_secs()
            ));
            self.automation_interval_secs = MIN_INTERVAL.as_secs();
        }
        if self.max_log_history == 0 {
            self.max_log_history = DEFAULT_LOG_HISTORY;
        }
        if self.max_log_file_size_mb == 0 {
            self.max_log_file_size_mb = DEFAULT_LOG_FILE_MB;
        } else if self.max_log_file_size_mb > MAX_LOG_FILE_MB {
            warnings.push(format!(
                "max_log_file_size_mb was set above the maximum of {MAX_LOG_FILE_MB} and has been adjusted to {MAX_LOG_FILE_MB}."
            ));
            self.max_log_file_size_mb = MAX_LOG_FILE_MB;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_TIMEOUT_SECS;
        }

        let (_, invalid) = parse_scan_ips(&self.scan_ips);
        for ip in invalid {
            warnings.push(format!("Invalid IP address format in scan_ips ignored: '{ip}'"));
        }
        if self.target_app_prefixes.is_empty() {
            warnings.push("target_app_prefixes is empty, nothing will be removed.".to_string());
        }

        warnings
    }
}

/// Load configuration from `path` (or the default location), then the
/// environment.
pub fn load(path: Option<&Path>) -> LoadedConfig {
    let mut warnings = Vec::new();

    let source = match path {
        Some(p) => Some(p.to_path_buf()),
        None => Config::default_path().ok(),
    };

    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    let mut used = None;
    if let Some(file) = &source {
        if file.exists() {
            figment = figment.merge(Yaml::file(file));
            used = Some(file.clone());
        } else if path.is_some() {
            warnings.push(format!(
                "config file {} not found, using defaults",
                file.display()
            ));
        }
    }
    figment = figment.merge(Env::prefixed(ENV_PREFIX));

    let mut config = match figment.extract::<Config>() {
        Ok(config) => config,
        Err(e) => {
            warnings.push(format!("invalid configuration ({e}), using defaults"));
            used = None;
            Config::default()
        }
    };
    warnings.extend(config.normalize());

    LoadedConfig {
        config,
        source: used,
        warnings,
    }
}

/// Split configured IP strings into valid addresses and rejected entries.
pub fn parse_scan_ips(raw: &[String]) -> (Vec<IpAddr>, Vec<String>) {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for entry in raw {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.parse::<IpAddr>() {
            Ok(ip) => valid.push(ip),
            Err(_) => invalid.push(entry.to_string()),
        }
    }
    (valid, invalid)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrCsv {
    List(Vec<String>),
    Csv(String),
}

fn list_or_csv<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items = match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(items) => items,
        ListOrCsv::Csv(s) => s.split(',').map(str::to_string).collect(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
