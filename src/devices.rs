//! Device inventory as seen by the monitor
//!
//! The monitor never edits the inventory. It re-reads it through a
//! [`DeviceSource`] at the start of every sweep, so additions and removals
//! take effect on the next cycle.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// A monitored network device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Address used for probing; unique within the inventory
    pub ip: String,

    pub name: Option<String>,

    /// SNMP community override for this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_community: Option<String>,

    /// Display metadata (type, model, group, ...) the monitor does not interpret
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Device {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            name: None,
            snmp_community: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.snmp_community = Some(community.into());
        self
    }
}

/// Producer of the current device list
///
/// Implementations must not fail: problems are logged and reported as an
/// empty list.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn load_devices(&self) -> Vec<Device>;
}

/// Device source backed by a JSON array on disk
#[derive(Debug, Clone)]
pub struct JsonFileDeviceSource {
    path: PathBuf,
}

impl JsonFileDeviceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> anyhow::Result<Vec<Device>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("failed to decode devices from {}", self.path.display()))
    }
}

#[async_trait]
impl DeviceSource for JsonFileDeviceSource {
    async fn load_devices(&self) -> Vec<Device> {
        match self.read().await {
            Ok(devices) => {
                trace!("loaded {} devices", devices.len());
                devices
            }
            Err(e) => {
                warn!("could not load devices: {e:#}");
                Vec::new()
            }
        }
    }
}

/// Fixed device list, mostly useful for embedding and tests
#[async_trait]
impl DeviceSource for Vec<Device> {
    async fn load_devices(&self) -> Vec<Device> {
        self.clone()
    }
}
