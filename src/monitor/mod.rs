//! Network monitor core
//!
//! Two background tasks write; any number of callers read.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │  MonitorBuilder  │
//!                 └────────┬─────────┘
//!                          │ spawns
//!            ┌─────────────┴──────────────┐
//!            │                            │
//!    ┌───────▼────────┐          ┌────────▼───────┐
//!    │ SweepScheduler │          │   SnmpPoller   │ (optional)
//!    └───────┬────────┘          └────────┬───────┘
//!            │ commits                    │ reads online set
//!    ┌───────▼─────────────────┐          │
//!    │ StatusStore             │◄─────────┘
//!    │ HistoryStore            │
//!    └───────┬─────────────────┘
//!            │ alerts                  snmp logs
//!    ┌───────▼─────────────────────────────────┐
//!    │ AlertBus → rings, event log, Emitter    │
//!    └─────────────────────────────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each task has an mpsc command channel (`*Now`, `Shutdown`)
//! 2. **Request/Response**: oneshot channels carry the cycle reports back
//! 3. **Reads**: [`NetworkMonitor`] reads the stores directly under read locks

pub mod flap;
pub mod history;
pub mod messages;
pub mod snmp;
pub mod status;
pub mod sweep;
pub mod transition;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::alerts::bus::AlertBus;
use crate::alerts::emitter::Emitter;
use crate::alerts::log::EventLog;
use crate::alerts::{Alert, AlertKind, SnmpLogEntry};
use crate::config::MonitorConfig;
use crate::devices::{DeviceSource, JsonFileDeviceSource};
use crate::prober::{Prober, SystemPingProber};

use history::{HistorySample, HistoryStore, UptimeSummary};
use messages::{SnmpReport, SweepReport};
use snmp::{SnmpClient, SnmpHandle};
use status::{StatusSnapshot, StatusStore};
use sweep::SweepHandle;

/// Stores shared between the background tasks and the read API
pub struct MonitorState {
    pub status: StatusStore,
    pub history: RwLock<HistoryStore>,
    pub bus: AlertBus,
}

impl MonitorState {
    pub fn new(config: &MonitorConfig, bus: AlertBus) -> Self {
        Self {
            status: StatusStore::new(),
            history: RwLock::new(HistoryStore::new(
                config.history_capacity,
                config.history_retention(),
            )),
            bus,
        }
    }
}

/// Inventory change reported by whoever manages the device list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChange {
    Added,
    Removed,
    Updated,
}

/// Wires the collaborators together and starts the background tasks
pub struct MonitorBuilder {
    config: MonitorConfig,
    source: Option<Arc<dyn DeviceSource>>,
    prober: Option<Arc<dyn Prober>>,
    emitter: Option<Arc<dyn Emitter>>,
    snmp_client: Option<Option<Arc<dyn SnmpClient>>>,
}

impl MonitorBuilder {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            source: None,
            prober: None,
            emitter: None,
            snmp_client: None,
        }
    }

    /// Defaults to the JSON file named in the config
    pub fn device_source(mut self, source: Arc<dyn DeviceSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Defaults to the system `ping`
    pub fn prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Use this client instead of the built-in one
    pub fn snmp_client(mut self, client: Arc<dyn SnmpClient>) -> Self {
        self.snmp_client = Some(Some(client));
        self
    }

    /// Never poll SNMP, whatever the config says
    pub fn without_snmp(mut self) -> Self {
        self.snmp_client = Some(None);
        self
    }

    /// Start the sweep scheduler and, if possible, the SNMP poller.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<NetworkMonitor> {
        let config = self.config;
        config.validate().context("invalid monitor configuration")?;

        let source = self
            .source
            .unwrap_or_else(|| Arc::new(JsonFileDeviceSource::new(&config.devices_file)));
        let prober = self
            .prober
            .unwrap_or_else(|| Arc::new(SystemPingProber::new()));

        let mut bus = AlertBus::new(config.alert_capacity, config.snmp_log_capacity);
        if let Some(path) = &config.event_log {
            debug!("appending events to {}", path.display());
            bus = bus.with_log(EventLog::new(path));
        }
        if let Some(emitter) = self.emitter {
            bus = bus.with_emitter(emitter);
        }

        let state = Arc::new(MonitorState::new(&config, bus));

        let sweep = SweepHandle::spawn(&config, state.clone(), source.clone(), prober);

        let snmp_client = match self.snmp_client {
            Some(client) => client,
            None => snmp::default_client(&config),
        };
        let snmp = snmp_client
            .map(|client| SnmpHandle::spawn(&config, state.clone(), source, client));

        info!(
            "monitor started (sweep every {}s, snmp {})",
            config.sweep_interval_secs,
            if snmp.is_some() { "on" } else { "off" }
        );

        Ok(NetworkMonitor { state, sweep, snmp })
    }
}

/// Running monitor and its read API
#[derive(Clone)]
pub struct NetworkMonitor {
    state: Arc<MonitorState>,
    sweep: SweepHandle,
    snmp: Option<SnmpHandle>,
}

impl NetworkMonitor {
    /// Status of every device from the last committed sweep
    pub async fn get_status(&self) -> StatusSnapshot {
        self.state.status.snapshot().await
    }

    /// Retained samples of every device, oldest first
    pub async fn get_history(&self) -> BTreeMap<String, Vec<HistorySample>> {
        self.state.history.read().await.snapshot()
    }

    pub async fn get_history_summary(&self) -> BTreeMap<String, UptimeSummary> {
        self.state.history.read().await.summarize()
    }

    /// Device with the lowest uptime and its rounded percentage
    pub async fn get_worst_device(&self) -> Option<(String, f64)> {
        self.state.history.read().await.worst()
    }

    /// Recent alerts, newest first
    pub async fn get_alerts(&self) -> Vec<Alert> {
        self.state.bus.list().await
    }

    /// Recent SNMP results, newest first
    pub async fn get_snmp_logs(&self) -> Vec<SnmpLogEntry> {
        self.state.bus.list_snmp().await
    }

    /// Record an inventory change in the alert ring and event log.
    pub async fn publish_device_event(
        &self,
        change: DeviceChange,
        ip: impl Into<String>,
        details: Value,
    ) {
        let ip = ip.into();
        let kind = match change {
            DeviceChange::Added => AlertKind::DeviceAdded { ip, details },
            DeviceChange::Removed => AlertKind::DeviceRemoved { ip, details },
            DeviceChange::Updated => AlertKind::DeviceUpdated { ip, details },
        };
        self.state.bus.publish(Alert::new(kind)).await;
    }

    /// Run a sweep now and wait for it to commit
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        self.sweep.sweep_now().await
    }

    /// Run an SNMP cycle now; `None` if SNMP polling is off
    pub async fn poll_snmp_now(&self) -> Result<Option<SnmpReport>> {
        match &self.snmp {
            Some(snmp) => Ok(Some(snmp.poll_now().await?)),
            None => Ok(None),
        }
    }

    pub fn snmp_enabled(&self) -> bool {
        self.snmp.is_some()
    }

    /// Stop both background tasks; stores stay readable.
    pub async fn shutdown(&self) -> Result<()> {
        self.sweep.shutdown().await?;
        if let Some(snmp) = &self.snmp {
            snmp.shutdown().await?;
        }
        info!("monitor stopped");
        Ok(())
    }
}
