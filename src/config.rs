use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::TimeDelta;
use tracing::trace;

use crate::util;

/// Seconds between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3;

/// Upper bound of probes in flight during one sweep.
pub const DEFAULT_MAX_WORKERS: usize = 65;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// History retention in minutes.
pub const DEFAULT_HISTORY_WINDOW_MINUTES: i64 = 60;

pub const DEFAULT_FLAP_WINDOW: usize = 6;

pub const DEFAULT_FLAP_THRESHOLD: usize = 4;

pub const DEFAULT_ALERT_CAPACITY: usize = 100;

pub const DEFAULT_SNMP_LOG_CAPACITY: usize = 100;

/// Monitoring configuration
///
/// Loaded once at startup; nothing in the running monitor changes it.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// JSON file holding the device inventory
    #[serde(default = "default_devices_file")]
    pub devices_file: PathBuf,

    /// Append-only JSON-lines event log (`None` disables it)
    #[serde(default = "default_event_log")]
    pub event_log: Option<PathBuf>,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Maximum samples kept per device
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Maximum sample age in minutes
    #[serde(default = "default_history_window")]
    pub history_window_minutes: i64,

    #[serde(default = "default_flap_window")]
    pub flap_window: usize,

    #[serde(default = "default_flap_threshold")]
    pub flap_threshold: usize,

    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,

    #[serde(default = "default_snmp_log_capacity")]
    pub snmp_log_capacity: usize,

    #[serde(default)]
    pub snmp: SnmpConfig,

    /// Push every event to this webhook as well
    pub webhook: Option<Webhook>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SnmpConfig {
    #[serde(default = "default_snmp_enabled")]
    pub enabled: bool,

    #[serde(default = "default_snmp_interval")]
    pub interval_secs: u64,

    /// Timeout of a single SNMP request
    #[serde(default = "default_snmp_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts after the first failed query
    #[serde(default = "default_snmp_retries")]
    pub retries: usize,

    #[serde(default = "default_snmp_port")]
    pub port: u16,

    /// Community used for devices without their own
    #[serde(default = "default_snmp_community")]
    pub community: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            devices_file: default_devices_file(),
            event_log: default_event_log(),
            sweep_interval_secs: default_sweep_interval(),
            max_workers: default_max_workers(),
            probe_timeout_secs: default_probe_timeout(),
            history_capacity: default_history_capacity(),
            history_window_minutes: default_history_window(),
            flap_window: default_flap_window(),
            flap_threshold: default_flap_threshold(),
            alert_capacity: default_alert_capacity(),
            snmp_log_capacity: default_snmp_log_capacity(),
            snmp: SnmpConfig::default(),
            webhook: None,
        }
    }
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            enabled: default_snmp_enabled(),
            interval_secs: default_snmp_interval(),
            timeout_secs: default_snmp_timeout(),
            retries: default_snmp_retries(),
            port: default_snmp_port(),
            community: default_snmp_community(),
        }
    }
}

impl MonitorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn history_retention(&self) -> TimeDelta {
        TimeDelta::minutes(self.history_window_minutes)
    }

    /// Check the invariants the monitor relies on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be greater than zero");
        }
        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be greater than zero");
        }
        if self.history_capacity == 0 || self.history_window_minutes <= 0 {
            anyhow::bail!("history must keep at least one sample for a positive duration");
        }
        // the flap window has to be a strict suffix of the history
        if self.flap_window < 2 || self.flap_window >= self.history_capacity {
            anyhow::bail!(
                "flap_window ({}) must be at least 2 and smaller than history_capacity ({})",
                self.flap_window,
                self.history_capacity
            );
        }
        if self.flap_threshold == 0 || self.flap_threshold >= self.flap_window {
            anyhow::bail!(
                "flap_threshold ({}) must be between 1 and flap_window - 1 ({})",
                self.flap_threshold,
                self.flap_window - 1
            );
        }
        if self.alert_capacity == 0 || self.snmp_log_capacity == 0 {
            anyhow::bail!("alert and snmp log capacities must be greater than zero");
        }
        if self.snmp.interval_secs == 0 {
            anyhow::bail!("snmp.interval_secs must be greater than zero");
        }
        Ok(())
    }
}

fn default_devices_file() -> PathBuf {
    PathBuf::from("./static/devices.json")
}

fn default_event_log() -> Option<PathBuf> {
    Some(PathBuf::from("./events.log"))
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_history_capacity() -> usize {
    (DEFAULT_HISTORY_WINDOW_MINUTES as usize * 60) / DEFAULT_SWEEP_INTERVAL_SECS as usize
}

fn default_history_window() -> i64 {
    DEFAULT_HISTORY_WINDOW_MINUTES
}

fn default_flap_window() -> usize {
    DEFAULT_FLAP_WINDOW
}

fn default_flap_threshold() -> usize {
    DEFAULT_FLAP_THRESHOLD
}

fn default_alert_capacity() -> usize {
    DEFAULT_ALERT_CAPACITY
}

fn default_snmp_log_capacity() -> usize {
    DEFAULT_SNMP_LOG_CAPACITY
}

fn default_snmp_enabled() -> bool {
    true
}

fn default_snmp_interval() -> u64 {
    60
}

fn default_snmp_timeout() -> u64 {
    2
}

fn default_snmp_retries() -> usize {
    1
}

fn default_snmp_port() -> u16 {
    161
}

fn default_snmp_community() -> String {
    "public".to_string()
}

/// Read a JSON config file, apply environment overrides and validate it.
pub fn read_config_file(path: &str) -> anyhow::Result<MonitorConfig> {
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {path}"))?;
    let mut config: MonitorConfig = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    util::apply_env_overrides(&mut config);
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
