//! Message types for the monitor's background tasks
//!
//! Each task owns an mpsc command channel; request/response commands carry a
//! oneshot sender for the reply.

use tokio::sync::oneshot;

use crate::alerts::Alert;

/// Commands that can be sent to the SweepScheduler
#[derive(Debug)]
pub enum SweepCommand {
    /// Run a sweep right away instead of waiting for the next tick
    SweepNow {
        respond_to: oneshot::Sender<SweepReport>,
    },

    /// Stop the loop; an in-flight sweep finishes first
    Shutdown,
}

/// What a single sweep did
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Sequence number of the sweep (1-based)
    pub sweep: u64,

    /// Devices probed; zero means the sweep was skipped
    pub devices: usize,

    /// Devices that answered
    pub online: usize,

    /// Alerts raised while committing
    pub alerts: Vec<Alert>,
}

impl SweepReport {
    pub fn skipped(&self) -> bool {
        self.devices == 0
    }
}

/// Commands that can be sent to the SnmpPoller
#[derive(Debug)]
pub enum SnmpCommand {
    /// Run a poll cycle right away
    PollNow {
        respond_to: oneshot::Sender<SnmpReport>,
    },

    Shutdown,
}

/// What a single SNMP cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnmpReport {
    /// Online devices queried
    pub polled: usize,

    /// Devices that returned any data
    pub answered: usize,
}
