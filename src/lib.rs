//! Network device monitor
//!
//! Periodically probes a set of devices, keeps their latest status and a
//! rolling history, raises alerts on transitions and flapping, and
//! optionally enriches online devices over SNMP.

pub mod alerts;
pub mod config;
pub mod devices;
pub mod monitor;
pub mod prober;
pub mod util;

pub use alerts::{Alert, AlertKind, SnmpLogEntry};
pub use config::MonitorConfig;
pub use devices::{Device, DeviceSource};
pub use monitor::{DeviceChange, MonitorBuilder, NetworkMonitor};
pub use prober::Prober;
