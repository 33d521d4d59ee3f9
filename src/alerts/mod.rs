//! Alert and event pipeline
//!
//! Everything the monitor wants to tell the outside world flows through the
//! [`bus::AlertBus`]:
//!
//! ```text
//! Sweep detectors ─┐
//!                  ├─→ AlertBus ─┬─→ bounded rings (alerts, snmp logs)
//! SNMP poller ─────┘             ├─→ durable JSON-lines log
//!                                └─→ Emitter (optional push)
//! ```

pub mod bus;
pub mod emitter;
pub mod log;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event name for a full status snapshot after each sweep
pub const STATUS_UPDATE_EVENT: &str = "status_update";

pub const ALERT_EVENT: &str = "alert";

pub const DEVICE_EVENT: &str = "device_event";

pub const SNMP_LOG_EVENT: &str = "snmp_log";

/// What happened to a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    /// The device entered the flapping state
    Flapping { ip: String, transitions: usize },

    /// The device came back online
    Online { ip: String },

    /// The device went offline
    Offline { ip: String },

    DeviceAdded {
        ip: String,
        details: serde_json::Value,
    },

    DeviceRemoved {
        ip: String,
        details: serde_json::Value,
    },

    DeviceUpdated {
        ip: String,
        details: serde_json::Value,
    },
}

impl AlertKind {
    pub fn ip(&self) -> &str {
        match self {
            AlertKind::Flapping { ip, .. }
            | AlertKind::Online { ip }
            | AlertKind::Offline { ip }
            | AlertKind::DeviceAdded { ip, .. }
            | AlertKind::DeviceRemoved { ip, .. }
            | AlertKind::DeviceUpdated { ip, .. } => ip,
        }
    }

    /// Inventory changes are logged as device events rather than alerts.
    pub fn is_device_event(&self) -> bool {
        matches!(
            self,
            AlertKind::DeviceAdded { .. }
                | AlertKind::DeviceRemoved { .. }
                | AlertKind::DeviceUpdated { .. }
        )
    }

    fn message(&self) -> String {
        match self {
            AlertKind::Flapping { ip, transitions } => {
                format!("Device {ip} is flapping ({transitions} state changes in recent window)")
            }
            AlertKind::Online { ip } => format!("Device {ip} is back online"),
            AlertKind::Offline { ip } => format!("Device {ip} went offline"),
            AlertKind::DeviceAdded { ip, .. } => format!("Device {ip} was added"),
            AlertKind::DeviceRemoved { ip, .. } => format!("Device {ip} was removed"),
            AlertKind::DeviceUpdated { ip, .. } => format!("Device {ip} was updated"),
        }
    }
}

/// A timestamped, human-readable alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(flatten)]
    pub kind: AlertKind,

    pub timestamp: DateTime<Utc>,

    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind) -> Self {
        Self::at(kind, Utc::now())
    }

    pub fn at(kind: AlertKind, timestamp: DateTime<Utc>) -> Self {
        let message = kind.message();
        Self {
            kind,
            timestamp,
            message,
        }
    }

    pub fn ip(&self) -> &str {
        self.kind.ip()
    }
}

/// Result of one SNMP enrichment attempt
///
/// A device that did not answer is recorded with no description, no uptime
/// and no interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnmpLogEntry {
    pub ip: String,

    pub timestamp: DateTime<Utc>,

    /// sysDescr
    pub description: Option<String>,

    /// sysUpTime in seconds
    pub uptime: Option<u64>,

    /// ifDescr of every interface that answered
    pub interfaces: Vec<String>,
}

impl SnmpLogEntry {
    pub fn no_data(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            timestamp: Utc::now(),
            description: None,
            uptime: None,
            interfaces: Vec::new(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.description.is_some() || self.uptime.is_some() || !self.interfaces.is_empty()
    }
}

/// Event pushed to live subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorEvent {
    pub event: String,
    pub payload: serde_json::Value,
}
