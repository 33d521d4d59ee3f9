//! SnmpPoller - periodic SNMP enrichment of online devices
//!
//! Only devices that were online in the last committed sweep are queried.
//! Every queried device produces exactly one [`SnmpLogEntry`]; a device that
//! never answered is recorded without data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use crate::alerts::SnmpLogEntry;
use crate::config::MonitorConfig;
use crate::devices::DeviceSource;

use super::MonitorState;
use super::messages::{SnmpCommand, SnmpReport};

/// Maximum concurrent SNMP queries
const MAX_CONCURRENT_SNMP: usize = 20;

/// Interfaces beyond this index are not described
pub const MAX_INTERFACES: usize = 32;

/// Whether this build can speak SNMP at all
pub const SNMP_AVAILABLE: bool = cfg!(feature = "snmp");

/// Data returned by one successful query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnmpData {
    pub description: Option<String>,
    pub uptime: Option<u64>,
    pub interfaces: Vec<String>,
}

impl SnmpData {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.uptime.is_none() && self.interfaces.is_empty()
    }

    fn into_entry(self, ip: &str) -> SnmpLogEntry {
        SnmpLogEntry {
            description: self.description,
            uptime: self.uptime,
            interfaces: self.interfaces,
            ..SnmpLogEntry::no_data(ip)
        }
    }
}

/// Something that can query a device over SNMP
#[async_trait]
pub trait SnmpClient: Send + Sync {
    /// Query one device. `timeout` bounds every individual request.
    ///
    /// Returns an error if the device gave no data at all.
    async fn query(&self, ip: &str, community: &str, timeout: Duration) -> Result<SnmpData>;
}

#[cfg(feature = "snmp")]
pub use snmp2_client::Snmp2Client;

#[cfg(feature = "snmp")]
mod snmp2_client {
    use std::net::{IpAddr, SocketAddr};
    use std::time::Duration;

    use anyhow::{Context, Result, bail};
    use async_trait::async_trait;
    use snmp2::{AsyncSession, Oid, Value};
    use tokio::time::timeout;

    use super::{MAX_INTERFACES, SnmpClient, SnmpData};

    const OID_SYS_DESCR: &[u64] = &[1, 3, 6, 1, 2, 1, 1, 1, 0];
    const OID_SYS_UPTIME: &[u64] = &[1, 3, 6, 1, 2, 1, 1, 3, 0];
    const OID_IF_NUMBER: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 1, 0];
    const OID_IF_DESCR: &[u64] = &[1, 3, 6, 1, 2, 1, 2, 2, 1, 2];

    /// SNMPv2c client backed by `snmp2`
    #[derive(Debug, Clone)]
    pub struct Snmp2Client {
        port: u16,
    }

    impl Snmp2Client {
        pub fn new(port: u16) -> Self {
            Self { port }
        }

        fn target(&self, ip: &str) -> String {
            match ip.parse::<IpAddr>() {
                Ok(addr) => SocketAddr::new(addr, self.port).to_string(),
                Err(_) => format!("{ip}:{}", self.port),
            }
        }
    }

    #[async_trait]
    impl SnmpClient for Snmp2Client {
        async fn query(&self, ip: &str, community: &str, timeout_dur: Duration) -> Result<SnmpData> {
            let addr = self.target(ip);

            let mut session = timeout(
                timeout_dur,
                AsyncSession::new_v2c(&addr, community.as_bytes(), 0),
            )
            .await
            .context("timed out opening SNMP session")?
            .with_context(|| format!("failed to open SNMP session to {addr}"))?;

            let mut data = SnmpData::default();

            if let Ok(oid) = Oid::from(OID_SYS_DESCR)
                && let Ok(Ok(mut response)) = timeout(timeout_dur, session.get(&oid)).await
                && let Some((_, Value::OctetString(bytes))) = response.varbinds.next()
            {
                let descr = String::from_utf8_lossy(bytes).trim().to_string();
                if !descr.is_empty() {
                    data.description = Some(descr);
                }
            }

            // sysUpTime is in centiseconds
            if let Ok(oid) = Oid::from(OID_SYS_UPTIME)
                && let Ok(Ok(mut response)) = timeout(timeout_dur, session.get(&oid)).await
                && let Some((_, Value::Timeticks(ticks))) = response.varbinds.next()
            {
                data.uptime = Some(ticks as u64 / 100);
            }

            let mut interface_count = 0;
            if let Ok(oid) = Oid::from(OID_IF_NUMBER)
                && let Ok(Ok(mut response)) = timeout(timeout_dur, session.get(&oid)).await
                && let Some((_, Value::Integer(count))) = response.varbinds.next()
            {
                interface_count = usize::try_from(count).unwrap_or(0).min(MAX_INTERFACES);
            }

            for index in 1..=interface_count as u64 {
                let parts: Vec<u64> = OID_IF_DESCR.iter().copied().chain([index]).collect();
                if let Ok(oid) = Oid::from(&parts)
                    && let Ok(Ok(mut response)) = timeout(timeout_dur, session.get(&oid)).await
                    && let Some((_, Value::OctetString(bytes))) = response.varbinds.next()
                {
                    let name = String::from_utf8_lossy(bytes).trim().to_string();
                    if !name.is_empty() {
                        data.interfaces.push(name);
                    }
                }
            }

            if data.is_empty() {
                bail!("{addr} returned no SNMP data");
            }
            Ok(data)
        }
    }
}

/// The client this build uses by default, if SNMP is enabled and available
pub fn default_client(config: &MonitorConfig) -> Option<Arc<dyn SnmpClient>> {
    if !config.snmp.enabled {
        debug!("snmp polling disabled in config");
        return None;
    }
    if !SNMP_AVAILABLE {
        info!("snmp support not compiled in, skipping enrichment");
        return None;
    }
    platform_client(config.snmp.port)
}

#[cfg(feature = "snmp")]
fn platform_client(port: u16) -> Option<Arc<dyn SnmpClient>> {
    Some(Arc::new(Snmp2Client::new(port)))
}

#[cfg(not(feature = "snmp"))]
fn platform_client(_port: u16) -> Option<Arc<dyn SnmpClient>> {
    None
}

/// Query once plus up to `retries` more times.
async fn query_with_retries(
    client: &dyn SnmpClient,
    ip: &str,
    community: &str,
    timeout: Duration,
    retries: usize,
) -> Option<SnmpData> {
    for attempt in 0..=retries {
        match client.query(ip, community, timeout).await {
            Ok(data) => return Some(data),
            Err(e) => trace!("snmp query to {ip} failed (attempt {}): {e:#}", attempt + 1),
        }
    }
    None
}

pub struct SnmpPoller {
    state: Arc<MonitorState>,
    source: Arc<dyn DeviceSource>,
    client: Arc<dyn SnmpClient>,

    command_rx: mpsc::Receiver<SnmpCommand>,

    interval_duration: Duration,
    timeout: Duration,
    retries: usize,
    default_community: String,
}

impl SnmpPoller {
    pub fn new(
        config: &MonitorConfig,
        state: Arc<MonitorState>,
        source: Arc<dyn DeviceSource>,
        client: Arc<dyn SnmpClient>,
        command_rx: mpsc::Receiver<SnmpCommand>,
    ) -> Self {
        Self {
            state,
            source,
            client,
            command_rx,
            interval_duration: Duration::from_secs(config.snmp.interval_secs),
            timeout: Duration::from_secs(config.snmp.timeout_secs),
            retries: config.snmp.retries,
            default_community: config.snmp.community.clone(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting snmp poller");

        let mut ticker = interval_at(
            Instant::now() + self.interval_duration,
            self.interval_duration,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }

                cmd = self.command_rx.recv(), if commands_open => {
                    match cmd {
                        Some(SnmpCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            let report = self.poll().await;
                            let _ = respond_to.send(report);
                        }

                        Some(SnmpCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            trace!("all handles dropped, polling on");
                            commands_open = false;
                        }
                    }
                }
            }
        }

        debug!("snmp poller stopped");
    }

    /// Query every online device and publish one entry per device.
    pub async fn poll(&self) -> SnmpReport {
        let online = self.state.status.online_addresses().await;
        if online.is_empty() {
            trace!("no online devices, skipping snmp cycle");
            return SnmpReport::default();
        }

        let communities: HashMap<String, String> = self
            .source
            .load_devices()
            .await
            .into_iter()
            .filter_map(|device| Some((device.ip, device.snmp_community?)))
            .collect();

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_SNMP));
        let mut handles = Vec::with_capacity(online.len());

        for ip in &online {
            let semaphore = Arc::clone(&semaphore);
            let client = Arc::clone(&self.client);
            let target = ip.clone();
            let community = communities
                .get(ip)
                .cloned()
                .unwrap_or_else(|| self.default_community.clone());
            let timeout = self.timeout;
            let retries = self.retries;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                query_with_retries(client.as_ref(), &target, &community, timeout, retries).await
            }));
        }

        let outcomes = futures::future::join_all(handles).await;

        let mut report = SnmpReport {
            polled: online.len(),
            answered: 0,
        };
        for (ip, outcome) in online.iter().zip(outcomes) {
            let entry = match outcome {
                Ok(Some(data)) => {
                    report.answered += 1;
                    data.into_entry(ip)
                }
                Ok(None) => SnmpLogEntry::no_data(ip),
                Err(e) => {
                    warn!("snmp task for {ip} failed: {e}");
                    SnmpLogEntry::no_data(ip)
                }
            };
            self.state.bus.publish_snmp(entry).await;
        }

        debug!(
            "snmp cycle: {}/{} devices answered",
            report.answered, report.polled
        );
        report
    }
}

/// Handle for controlling an SnmpPoller
#[derive(Clone)]
pub struct SnmpHandle {
    sender: mpsc::Sender<SnmpCommand>,
}

impl SnmpHandle {
    pub fn spawn(
        config: &MonitorConfig,
        state: Arc<MonitorState>,
        source: Arc<dyn DeviceSource>,
        client: Arc<dyn SnmpClient>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let poller = SnmpPoller::new(config, state, source, client, cmd_rx);
        tokio::spawn(poller.run());

        Self { sender: cmd_tx }
    }

    /// Trigger an immediate poll cycle and wait for its report
    pub async fn poll_now(&self) -> Result<SnmpReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SnmpCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive snmp report")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SnmpCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
