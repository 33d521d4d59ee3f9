//! AlertBus - single funnel for alerts and SNMP log entries
//!
//! ## Publishing an alert
//!
//! ```text
//! publish(alert)
//!   ├─ ring lock ─→ push_front into ring, drop oldest beyond capacity
//!   │               take the log lock, release the ring lock
//!   ├─ log lock ──→ append to durable log (failure logged, ignored)
//!   └─ unlocked ──→ emitter.emit("alert" | "device_event", alert)
//!                   (error or panic logged, ignored)
//! ```
//!
//! The sweep scheduler and the SNMP poller publish concurrently; the ring
//! lock gives every publication a place in one total order, and the log lock
//! is always taken before the ring lock is released, so the file sees the
//! same order. Readers of the rings never wait on the disk.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use super::emitter::Emitter;
use super::log::EventLog;
use super::{ALERT_EVENT, Alert, DEVICE_EVENT, SNMP_LOG_EVENT, STATUS_UPDATE_EVENT, SnmpLogEntry};

#[derive(Debug)]
struct Rings {
    alerts: VecDeque<Alert>,
    snmp_logs: VecDeque<SnmpLogEntry>,
}

/// Bounded in-memory alert rings plus durable log plus optional push
pub struct AlertBus {
    rings: Mutex<Rings>,
    alert_capacity: usize,
    snmp_log_capacity: usize,
    log: Option<Mutex<EventLog>>,
    emitter: Option<Arc<dyn Emitter>>,
}

impl AlertBus {
    pub fn new(alert_capacity: usize, snmp_log_capacity: usize) -> Self {
        Self {
            rings: Mutex::new(Rings {
                alerts: VecDeque::with_capacity(alert_capacity),
                snmp_logs: VecDeque::with_capacity(snmp_log_capacity),
            }),
            alert_capacity,
            snmp_log_capacity,
            log: None,
            emitter: None,
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(Mutex::new(log));
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Record an alert, persist it and push it to subscribers.
    pub async fn publish(&self, alert: Alert) {
        let kind = if alert.kind.is_device_event() {
            DEVICE_EVENT
        } else {
            ALERT_EVENT
        };
        debug!("{}", alert.message);

        let log = {
            let mut rings = self.rings.lock().await;
            rings.alerts.push_front(alert.clone());
            rings.alerts.truncate(self.alert_capacity);
            self.log_turn().await
        };
        Self::append_to_log(log, kind, &alert).await;

        self.emit_serialized(kind, &alert);
    }

    /// Record an SNMP result, persist it and push it to subscribers.
    pub async fn publish_snmp(&self, entry: SnmpLogEntry) {
        let log = {
            let mut rings = self.rings.lock().await;
            rings.snmp_logs.push_front(entry.clone());
            rings.snmp_logs.truncate(self.snmp_log_capacity);
            self.log_turn().await
        };
        Self::append_to_log(log, SNMP_LOG_EVENT, &entry).await;

        self.emit_serialized(SNMP_LOG_EVENT, &entry);
    }

    /// Push a status snapshot; snapshots are not kept or logged.
    pub fn emit_status<T: Serialize>(&self, snapshot: &T) {
        self.emit_serialized(STATUS_UPDATE_EVENT, snapshot);
    }

    /// Alerts, newest first
    pub async fn list(&self) -> Vec<Alert> {
        self.rings.lock().await.alerts.iter().cloned().collect()
    }

    /// SNMP log entries, newest first
    pub async fn list_snmp(&self) -> Vec<SnmpLogEntry> {
        self.rings.lock().await.snmp_logs.iter().cloned().collect()
    }

    /// Reserve the next slot in the durable log; called under the ring lock.
    async fn log_turn(&self) -> Option<MutexGuard<'_, EventLog>> {
        match &self.log {
            Some(log) => Some(log.lock().await),
            None => None,
        }
    }

    async fn append_to_log<T: Serialize>(
        log: Option<MutexGuard<'_, EventLog>>,
        kind: &str,
        payload: &T,
    ) {
        let Some(log) = log else {
            return;
        };

        if let Err(e) = log.append(kind, chrono::Utc::now(), payload).await {
            warn!("failed to append {kind} to {}: {e}", log.path().display());
        }
    }

    fn emit_serialized<T: Serialize>(&self, event: &str, payload: &T) {
        let Some(emitter) = &self.emitter else {
            return;
        };

        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to serialize {event} payload: {e}");
                return;
            }
        };

        Self::emit_guarded(emitter.as_ref(), event, &payload);
    }

    fn emit_guarded(emitter: &dyn Emitter, event: &str, payload: &Value) {
        match catch_unwind(AssertUnwindSafe(|| emitter.emit(event, payload))) {
            Ok(Ok(())) => trace!("emitted {event}"),
            Ok(Err(e)) => warn!("emitter failed for {event}: {e:#}"),
            Err(_) => warn!("emitter panicked for {event}"),
        }
    }
}
