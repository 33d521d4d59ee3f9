//! End-to-end sweep tests: device set → probes → stores → alerts

use crate::helpers::*;
use assert_matches::assert_matches;
use netpulse::{AlertKind, DeviceChange, MonitorBuilder};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_status_keys_follow_device_set() {
    let devices = SharedDevices::new(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.always("10.0.0.1", Some(1.2));
    prober.always("10.0.0.2", Some(3.4));
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    let report = monitor.sweep_now().await.unwrap();
    assert_eq!(report.devices, 3);
    assert_eq!(report.online, 2);

    let status = monitor.get_status().await;
    assert_eq!(
        status.keys().cloned().collect::<Vec<_>>(),
        vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
    );
    assert_eq!(status["10.0.0.2"].latency, Some(3.4));
    assert!(!status["10.0.0.3"].online);

    // a removed device leaves the status map but keeps its history
    devices.set(&["10.0.0.1", "10.0.0.2"]);
    monitor.sweep_now().await.unwrap();

    let status = monitor.get_status().await;
    assert_eq!(status.len(), 2);
    assert!(!status.contains_key("10.0.0.3"));
    assert_eq!(monitor.get_history().await["10.0.0.3"].len(), 1);
    assert_eq!(monitor.get_history().await["10.0.0.1"].len(), 2);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_last_seen_survives_offline_sweeps() {
    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.script("10.0.0.1", &[Some(2.0), None, None]);
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    monitor.sweep_now().await.unwrap();
    let seen = monitor.get_status().await["10.0.0.1"].last_seen;
    assert!(seen.is_some());

    monitor.sweep_now().await.unwrap();
    monitor.sweep_now().await.unwrap();

    let record = &monitor.get_status().await["10.0.0.1"];
    assert!(!record.online);
    assert_eq!(record.latency, None);
    assert_eq!(record.last_seen, seen);
}

#[tokio::test]
async fn test_never_seen_device_has_no_last_seen() {
    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    monitor.sweep_now().await.unwrap();

    assert_eq!(monitor.get_status().await["10.0.0.1"].last_seen, None);
}

#[tokio::test]
async fn test_empty_device_set_leaves_stores_untouched() {
    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.always("10.0.0.1", Some(1.0));
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    monitor.sweep_now().await.unwrap();
    let before = monitor.get_status().await;

    devices.set(&[]);
    let report = monitor.sweep_now().await.unwrap();

    assert!(report.skipped());
    assert_eq!(monitor.get_status().await, before);
    assert_eq!(monitor.get_history().await["10.0.0.1"].len(), 1);
    assert_eq!(prober.calls(), 1);
}

#[tokio::test]
async fn test_alternating_device_flaps_exactly_once() {
    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.alternate("10.0.0.1", 8);
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    let mut flapped_at = vec![];
    for sweep in 1..=8 {
        let report = monitor.sweep_now().await.unwrap();
        for alert in report.alerts {
            if let AlertKind::Flapping { transitions, .. } = alert.kind {
                flapped_at.push((sweep, transitions));
            }
        }
    }

    // no verdict until six samples exist; the sixth holds five transitions
    assert_eq!(flapped_at, vec![(6, 5)]);

    let flapping: Vec<_> = monitor
        .get_alerts()
        .await
        .into_iter()
        .filter(|a| matches!(a.kind, AlertKind::Flapping { .. }))
        .collect();
    assert_eq!(flapping.len(), 1);
    assert_matches!(
        &flapping[0].kind,
        AlertKind::Flapping { ip, transitions: 5 } if ip == "10.0.0.1"
    );
}

#[tokio::test]
async fn test_transitions_alert_once_per_change() {
    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.script("10.0.0.1", &[Some(1.0), Some(1.0), None, None, Some(1.0)]);
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    for _ in 0..5 {
        monitor.sweep_now().await.unwrap();
    }

    let kinds: Vec<AlertKind> = monitor
        .get_alerts()
        .await
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            AlertKind::Online {
                ip: "10.0.0.1".to_string()
            },
            AlertKind::Offline {
                ip: "10.0.0.1".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_status_update_emitted_after_every_sweep() {
    let devices = SharedDevices::new(&["10.0.0.1", "10.0.0.2"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.script("10.0.0.1", &[Some(1.0), None]);
    let emitter = Arc::new(RecordingEmitter::default());
    let monitor = MonitorBuilder::new(create_test_config())
        .device_source(Arc::new(devices.clone()))
        .prober(prober.clone())
        .emitter(emitter.clone())
        .without_snmp()
        .spawn()
        .unwrap();

    monitor.sweep_now().await.unwrap();
    monitor.sweep_now().await.unwrap();

    assert_eq!(emitter.count("status_update"), 2);
    assert_eq!(emitter.count("alert"), 1);

    let events = emitter.events();
    let (last_name, last_payload) = events.last().unwrap();
    assert_eq!(last_name, "status_update");
    assert_eq!(last_payload["10.0.0.1"]["online"], json!(false));
    assert_eq!(last_payload["10.0.0.2"]["latency"], json!(null));

    // the alert is pushed before the snapshot of the same sweep
    let alert_pos = events.iter().position(|(name, _)| name == "alert").unwrap();
    assert_eq!(alert_pos, events.len() - 2);
}

#[tokio::test]
async fn test_summary_and_worst_device() {
    let devices = SharedDevices::new(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.always("10.0.0.1", Some(1.0));
    prober.script("10.0.0.2", &[Some(1.0), None, None]);
    prober.script("10.0.0.3", &[Some(1.0), Some(1.0), None]);
    let monitor = spawn_monitor(create_test_config(), &devices, &prober);

    for _ in 0..3 {
        monitor.sweep_now().await.unwrap();
    }

    let summary = monitor.get_history_summary().await;
    assert_eq!(summary["10.0.0.1"].uptime_percent, 100.0);
    assert_eq!(summary["10.0.0.2"].uptime_percent, 33.3);
    assert_eq!(summary["10.0.0.3"].uptime_percent, 66.7);
    assert_eq!(summary["10.0.0.3"].sample_count, 3);

    assert_eq!(
        monitor.get_worst_device().await,
        Some(("10.0.0.2".to_string(), 33.3))
    );
}

#[tokio::test]
async fn test_history_capacity_is_respected() {
    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.always("10.0.0.1", Some(1.0));
    let config = create_test_config();
    let capacity = config.history_capacity;
    let monitor = spawn_monitor(config, &devices, &prober);

    for _ in 0..capacity + 5 {
        monitor.sweep_now().await.unwrap();
    }

    let history = monitor.get_history().await;
    assert_eq!(history["10.0.0.1"].len(), capacity);
    assert!(
        history["10.0.0.1"]
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    );
}

#[tokio::test]
async fn test_events_are_appended_to_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("events.log");
    let mut config = create_test_config();
    config.event_log = Some(log_path.clone());

    let devices = SharedDevices::new(&["10.0.0.1"]);
    let prober = Arc::new(ScriptedProber::new());
    prober.script("10.0.0.1", &[Some(1.0), None]);
    let monitor = spawn_monitor(config, &devices, &prober);

    monitor.sweep_now().await.unwrap();
    monitor.sweep_now().await.unwrap();
    monitor
        .publish_device_event(DeviceChange::Added, "10.0.0.7", json!({"name": "printer"}))
        .await;

    let contents = tokio::fs::read_to_string(&log_path).await.unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["kind"], "alert");
    assert_eq!(lines[0]["payload"]["type"], "offline");
    assert_eq!(lines[1]["kind"], "device_event");
    assert_eq!(lines[1]["payload"]["details"]["name"], "printer");

    let alerts = monitor.get_alerts().await;
    assert_eq!(alerts.len(), 2);
    assert_matches!(alerts[0].kind, AlertKind::DeviceAdded { .. });
}
