//! Failure handling
//!
//! A broken collaborator (emitter, event log, prober, device file) must never
//! stop a sweep from committing.

use crate::helpers::*;
use netpulse::{
    AlertKind, MonitorBuilder,
    alerts::emitter::Emitter,
    devices::JsonFileDeviceSource,
};
use serde_json::Value;
use std::sync::Arc;

fn failing_emitter() -> Arc<dyn Emitter> {
    Arc::new(|_: &str, _: &Value| -> anyhow::Result<()> { anyhow::bail!("subscriber gone") })
}

fn panicking_emitter() -> Arc<dyn Emitter> {
    Arc::new(|event: &str, _: &Value| -> anyhow::Result<()> { panic!("emitter bug on {event}") })
}

async fn run_offline_transition(emitter: Arc<dyn Emitter>) -> netpulse::NetworkMonitor {
    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.script("10.0.0.1", &[Some(1.0), None]);

    let monitor = MonitorBuilder::new(create_test_config())
        .device_source(Arc::new(devices))
        .prober(prober)
        .emitter(emitter)
        .without_snmp()
        .spawn()
        .unwrap();

    monitor.sweep_now().await.unwrap();
    monitor.sweep_now().await.unwrap();
    monitor
}

#[tokio::test]
async fn test_failing_emitter_does_not_block_commit() {
    let monitor = run_offline_transition(failing_emitter()).await;

    assert!(!monitor.get_status().await["10.0.0.1"].online);
    assert_eq!(monitor.get_alerts().await.len(), 1);
}

#[tokio::test]
async fn test_panicking_emitter_does_not_kill_scheduler() {
    let monitor = run_offline_transition(panicking_emitter()).await;

    assert_eq!(monitor.get_alerts().await.len(), 1);
    // the scheduler task is still alive
    let report = monitor.sweep_now().await.unwrap();
    assert_eq!(report.devices, 1);
}

#[tokio::test]
async fn test_unwritable_event_log_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config();
    // a directory cannot be opened for appending
    config.event_log = Some(dir.path().to_path_buf());

    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.script("10.0.0.1", &[Some(1.0), None]);
    let monitor = spawn_monitor(config, &devices, &prober);

    monitor.sweep_now().await.unwrap();
    let report = monitor.sweep_now().await.unwrap();

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(
        monitor.get_alerts().await[0].kind,
        AlertKind::Offline {
            ip: "10.0.0.1".to_string()
        }
    );
}

#[tokio::test]
async fn test_panicking_probe_marks_only_that_device_offline() {
    let devices = SharedDevices::new(&["10.0.0.1", "10.0.0.2"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.always("10.0.0.1", Some(1.0));
    prober.always("10.0.0.2", Some(1.0));
    prober.panic_for("10.0.0.2");
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    let report = monitor.sweep_now().await.unwrap();

    assert_eq!(report.devices, 2);
    assert_eq!(report.online, 1);
    let status = monitor.get_status().await;
    assert!(status["10.0.0.1"].online);
    assert!(!status["10.0.0.2"].online);
}

#[tokio::test]
async fn test_missing_device_file_skips_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonFileDeviceSource::new(dir.path().join("missing.json"));
    let prober = Arc::new(ScriptedProber::new());

    let monitor = MonitorBuilder::new(create_test_config())
        .device_source(Arc::new(source))
        .prober(prober.clone())
        .without_snmp()
        .spawn()
        .unwrap();

    let report = monitor.sweep_now().await.unwrap();

    assert!(report.skipped());
    assert_eq!(prober.calls(), 0);
    assert!(monitor.get_status().await.is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = create_test_config();
    config.flap_threshold = config.flap_window;

    let result = MonitorBuilder::new(config).without_snmp().spawn();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_reads_survive_shutdown() {
    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.always("10.0.0.1", Some(1.0));
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    monitor.sweep_now().await.unwrap();
    monitor.shutdown().await.unwrap();

    assert!(monitor.sweep_now().await.is_err());
    assert!(monitor.get_status().await["10.0.0.1"].online);
    assert_eq!(monitor.get_history().await["10.0.0.1"].len(), 1);
}
