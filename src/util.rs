use std::path::PathBuf;

use crate::config::MonitorConfig;

const DEVICES_FILE: &str = "NETPULSE_DEVICES_FILE";

pub fn get_devices_file() -> Option<PathBuf> {
    std::env::var(DEVICES_FILE).ok().map(PathBuf::from)
}

const EVENT_LOG: &str = "NETPULSE_EVENT_LOG";

/// An empty value disables the event log.
pub fn get_event_log() -> Option<Option<PathBuf>> {
    let log_from_env = std::env::var(EVENT_LOG).ok()?;
    if log_from_env.is_empty() {
        Some(None)
    } else {
        Some(Some(PathBuf::from(log_from_env)))
    }
}

pub fn apply_env_overrides(config: &mut MonitorConfig) {
    if let Some(devices_file) = get_devices_file() {
        config.devices_file = devices_file;
    }
    if let Some(event_log) = get_event_log() {
        config.event_log = event_log;
    }
}
