//! Helper types for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use netpulse::{
    Device, DeviceSource, MonitorBuilder, MonitorConfig, NetworkMonitor, Prober,
    alerts::emitter::Emitter,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Config that never ticks on its own; tests drive sweeps with `sweep_now`
pub fn create_test_config() -> MonitorConfig {
    let mut config = MonitorConfig {
        sweep_interval_secs: 3600,
        event_log: None,
        history_capacity: 20,
        flap_window: 6,
        flap_threshold: 4,
        ..Default::default()
    };
    config.snmp.interval_secs = 3600;
    config
}

/// Device list that tests can change between sweeps
#[derive(Clone, Default)]
pub struct SharedDevices {
    devices: Arc<Mutex<Vec<Device>>>,
}

impl SharedDevices {
    pub fn new(ips: &[&str]) -> Self {
        let devices = Self::default();
        devices.set(ips);
        devices
    }

    pub fn set(&self, ips: &[&str]) {
        *self.devices.lock().unwrap() = ips.iter().map(|ip| Device::new(*ip)).collect();
    }

    pub fn replace(&self, devices: Vec<Device>) {
        *self.devices.lock().unwrap() = devices;
    }
}

#[async_trait]
impl DeviceSource for SharedDevices {
    async fn load_devices(&self) -> Vec<Device> {
        self.devices.lock().unwrap().clone()
    }
}

/// Prober that plays back a per-address script
///
/// Each probe consumes the next scripted answer; once a script runs out its
/// last answer repeats. Unscripted addresses are unreachable.
#[derive(Default)]
pub struct ScriptedProber {
    scripts: Mutex<HashMap<String, VecDeque<Option<f64>>>>,
    last: Mutex<HashMap<String, Option<f64>>>,
    delay: Mutex<Option<Duration>>,
    panics_for: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, ip: &str, answers: &[Option<f64>]) {
        self.scripts
            .lock()
            .unwrap()
            .insert(ip.to_string(), answers.iter().copied().collect());
    }

    pub fn always(&self, ip: &str, answer: Option<f64>) {
        self.script(ip, &[answer]);
    }

    /// Alternate offline/online, starting offline
    pub fn alternate(&self, ip: &str, sweeps: usize) {
        let answers: Vec<Option<f64>> = (0..sweeps)
            .map(|i| (i % 2 == 1).then_some(1.0))
            .collect();
        self.script(ip, &answers);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn panic_for(&self, ip: &str) {
        self.panics_for.lock().unwrap().push(ip.to_string());
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_answer(&self, ip: &str) -> Option<f64> {
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(ip)
            .and_then(|script| script.pop_front());

        let mut last = self.last.lock().unwrap();
        match next {
            Some(answer) => {
                last.insert(ip.to_string(), answer);
                answer
            }
            None => last.get(ip).copied().flatten(),
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, address: &str, _timeout: Duration) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let should_panic = self.panics_for.lock().unwrap().iter().any(|ip| ip == address);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if should_panic {
            panic!("scripted prober panic for {address}");
        }

        self.next_answer(address)
    }
}

/// Emitter that keeps everything it was handed
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .count()
    }
}

impl Emitter for RecordingEmitter {
    fn emit(&self, event: &str, payload: &Value) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), payload.clone()));
        Ok(())
    }
}

/// Start a monitor without SNMP on the given collaborators
pub fn spawn_monitor(
    config: MonitorConfig,
    devices: &SharedDevices,
    prober: &Arc<ScriptedProber>,
) -> NetworkMonitor {
    MonitorBuilder::new(config)
        .device_source(Arc::new(devices.clone()))
        .prober(prober.clone())
        .without_snmp()
        .spawn()
        .unwrap()
}
