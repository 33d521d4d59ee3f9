//! SweepScheduler - periodic fan-out/fan-in probing of every device
//!
//! ## Sweep cycle
//!
//! ```text
//! IDLE ──tick──→ load devices ──empty──→ IDLE
//!                     │
//!                     ▼
//!               FANNING_OUT: one probe task per device, bounded by a semaphore
//!                     │
//!                     ▼
//!               FANNING_IN: wait for every probe (no lock held)
//!                     │
//!                     ▼
//!               COMMIT: swap status map → append history → prune aged history
//!                       → flap + transition detectors → publish alerts
//!                       → emit status_update
//!                     │
//!                     └──→ IDLE (full interval, restarted after every commit)
//!     ↑
//!     └─── Commands (SweepNow, Shutdown)
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, trace, warn};

use crate::alerts::{Alert, AlertKind};
use crate::config::MonitorConfig;
use crate::devices::DeviceSource;
use crate::prober::Prober;

use super::MonitorState;
use super::flap::FlapDetector;
use super::history::HistorySample;
use super::messages::{SweepCommand, SweepReport};
use super::status::{StatusRecord, StatusSnapshot};
use super::transition::detect_transitions;

/// Single writer of the status and history stores
pub struct SweepScheduler {
    state: Arc<MonitorState>,
    source: Arc<dyn DeviceSource>,
    prober: Arc<dyn Prober>,
    flap: FlapDetector,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<SweepCommand>,

    interval_duration: Duration,
    probe_timeout: Duration,
    max_workers: usize,
    sweep_count: u64,
}

impl SweepScheduler {
    pub fn new(
        config: &MonitorConfig,
        state: Arc<MonitorState>,
        source: Arc<dyn DeviceSource>,
        prober: Arc<dyn Prober>,
        command_rx: mpsc::Receiver<SweepCommand>,
    ) -> Self {
        Self {
            state,
            source,
            prober,
            flap: FlapDetector::new(config.flap_window, config.flap_threshold),
            command_rx,
            interval_duration: config.sweep_interval(),
            probe_timeout: config.probe_timeout(),
            max_workers: config.max_workers,
            sweep_count: 0,
        }
    }

    /// Run sweeps until a Shutdown command arrives.
    ///
    /// The idle period restarts after every commit, so consecutive sweeps
    /// start at least one interval plus one sweep duration apart. Dropping
    /// every handle does not stop the loop.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting sweep scheduler");

        let idle = sleep(self.interval_duration);
        tokio::pin!(idle);
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = &mut idle => {
                    self.sweep().await;
                    idle.as_mut().reset(Instant::now() + self.interval_duration);
                }

                cmd = self.command_rx.recv(), if commands_open => {
                    match cmd {
                        Some(SweepCommand::SweepNow { respond_to }) => {
                            debug!("received SweepNow command");
                            let report = self.sweep().await;
                            let _ = respond_to.send(report);
                            idle.as_mut().reset(Instant::now() + self.interval_duration);
                        }

                        Some(SweepCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            trace!("all handles dropped, sweeping on");
                            commands_open = false;
                        }
                    }
                }
            }
        }

        debug!("sweep scheduler stopped");
    }

    /// Run one complete sweep and commit its results.
    pub async fn sweep(&mut self) -> SweepReport {
        self.sweep_count += 1;
        let sweep = self.sweep_count;

        let devices = self.source.load_devices().await;
        if devices.is_empty() {
            trace!("sweep #{sweep}: no devices, skipping");
            return SweepReport {
                sweep,
                ..Default::default()
            };
        }

        let mut seen = HashSet::new();
        let addresses: Vec<String> = devices
            .into_iter()
            .map(|device| device.ip)
            .filter(|ip| seen.insert(ip.clone()))
            .collect();

        let results = self.probe_all(addresses).await;
        let online = results.iter().filter(|(_, latency)| latency.is_some()).count();
        let alerts = self.commit(&results).await;

        debug!(
            "sweep #{sweep}: {online}/{} online, {} alerts",
            results.len(),
            alerts.len()
        );

        SweepReport {
            sweep,
            devices: results.len(),
            online,
            alerts,
        }
    }

    /// Probe every address through the bounded pool and wait for all of them.
    ///
    /// Results keep the order of `addresses`. A probe task that dies counts as
    /// unreachable.
    async fn probe_all(&self, addresses: Vec<String>) -> Vec<(String, Option<f64>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));

        let mut handles = Vec::with_capacity(addresses.len());
        for ip in &addresses {
            let semaphore = Arc::clone(&semaphore);
            let prober = Arc::clone(&self.prober);
            let target = ip.clone();
            let timeout = self.probe_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                prober.probe(&target, timeout).await
            }));
        }

        let outcomes = futures::future::join_all(handles).await;

        addresses
            .into_iter()
            .zip(outcomes)
            .map(|(ip, outcome)| match outcome {
                Ok(latency) => (ip, latency),
                Err(e) => {
                    warn!("probe task for {ip} failed: {e}");
                    (ip, None)
                }
            })
            .collect()
    }

    async fn commit(&mut self, results: &[(String, Option<f64>)]) -> Vec<Alert> {
        let now = Utc::now();

        let previous = self.state.status.snapshot().await;
        let next: StatusSnapshot = results
            .iter()
            .map(|(ip, latency)| {
                (
                    ip.clone(),
                    StatusRecord::observe(*latency, previous.get(ip), now),
                )
            })
            .collect();
        let previous = self.state.status.commit(next.clone()).await;

        let mut raised = Vec::new();
        {
            let mut history = self.state.history.write().await;
            for (ip, latency) in results {
                history.record(ip, HistorySample::new(now, *latency), now);

                let window = history.window(ip, self.flap.window());
                if let Some(transitions) = self.flap.evaluate(ip, &window) {
                    info!("{ip}: flapping ({transitions} transitions)");
                    raised.push(AlertKind::Flapping {
                        ip: ip.clone(),
                        transitions,
                    });
                }
            }
            history.prune(now);
        }
        self.flap.retain(|ip| next.contains_key(ip));

        raised.extend(detect_transitions(&previous, &next));

        let mut alerts = Vec::with_capacity(raised.len());
        for kind in raised {
            let alert = Alert::at(kind, now);
            self.state.bus.publish(alert.clone()).await;
            alerts.push(alert);
        }

        self.state.bus.emit_status(&next);

        alerts
    }
}

/// Handle for controlling a SweepScheduler
#[derive(Clone)]
pub struct SweepHandle {
    sender: mpsc::Sender<SweepCommand>,
}

impl SweepHandle {
    /// Spawn the scheduler as a tokio task
    pub fn spawn(
        config: &MonitorConfig,
        state: Arc<MonitorState>,
        source: Arc<dyn DeviceSource>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let scheduler = SweepScheduler::new(config, state, source, prober, cmd_rx);
        tokio::spawn(scheduler.run());

        Self { sender: cmd_tx }
    }

    /// Trigger an immediate sweep and wait for its report
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SweepCommand::SweepNow { respond_to: tx })
            .await
            .context("failed to send SweepNow command")?;

        rx.await.context("failed to receive sweep report")
    }

    /// Stop the scheduler after any in-flight sweep
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SweepCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
