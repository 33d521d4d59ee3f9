//! Latest known state of every device

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Outcome of the most recent sweep for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub online: bool,

    /// Round-trip time in milliseconds (`Some(0.0)` if reachable but untimed)
    pub latency: Option<f64>,

    /// Last time the device answered; kept across offline sweeps
    pub last_seen: Option<DateTime<Utc>>,
}

impl StatusRecord {
    /// Build the record for a fresh probe result.
    ///
    /// An unreachable device inherits `last_seen` from its previous record.
    pub fn observe(
        latency: Option<f64>,
        previous: Option<&StatusRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let online = latency.is_some();
        let last_seen = if online {
            Some(now)
        } else {
            previous.and_then(|p| p.last_seen)
        };

        Self {
            online,
            latency,
            last_seen,
        }
    }
}

pub type StatusSnapshot = BTreeMap<String, StatusRecord>;

/// Status of every device from the last committed sweep
///
/// Commits replace the whole map, so devices missing from the latest sweep
/// disappear and readers always see exactly one sweep's results.
#[derive(Debug, Default)]
pub struct StatusStore {
    current: RwLock<StatusSnapshot>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.current.read().await.clone()
    }

    /// Install `next` and hand back the snapshot it replaced.
    pub async fn commit(&self, next: StatusSnapshot) -> StatusSnapshot {
        let mut current = self.current.write().await;
        std::mem::replace(&mut *current, next)
    }

    /// Addresses that were online in the last sweep
    pub async fn online_addresses(&self) -> Vec<String> {
        self.current
            .read()
            .await
            .iter()
            .filter(|(_, record)| record.online)
            .map(|(ip, _)| ip.clone())
            .collect()
    }
}
