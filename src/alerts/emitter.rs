//! Push port for live subscribers
//!
//! The bus hands every event to at most one [`Emitter`]. Emitters report
//! failures through their return value, but nobody acts on them: the bus logs
//! and drops the error, and a panicking emitter is caught as well.

use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{error, trace};

use super::MonitorEvent;

/// Fire-and-forget sink for `(event_name, payload)` pairs
pub trait Emitter: Send + Sync {
    fn emit(&self, event: &str, payload: &Value) -> anyhow::Result<()>;
}

impl<F> Emitter for F
where
    F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync,
{
    fn emit(&self, event: &str, payload: &Value) -> anyhow::Result<()> {
        self(event, payload)
    }
}

/// Fans events out to any number of subscribers (e.g. WebSocket sessions)
///
/// Slow subscribers lag and lose events, which is fine for live updates.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    sender: broadcast::Sender<MonitorEvent>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }
}

impl Emitter for BroadcastEmitter {
    fn emit(&self, event: &str, payload: &Value) -> anyhow::Result<()> {
        let event = MonitorEvent {
            event: event.to_string(),
            payload: payload.clone(),
        };

        // no subscribers is not an error
        match self.sender.send(event) {
            Ok(receivers) => trace!("published event to {receivers} receivers"),
            Err(_) => trace!("no receivers for event (this is OK)"),
        }

        Ok(())
    }
}

/// Posts every event as JSON to a webhook
///
/// Requests run on their own task so the bus never waits on the network.
#[derive(Debug, Clone)]
pub struct WebhookEmitter {
    client: Client,
    url: String,
}

impl WebhookEmitter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

impl Emitter for WebhookEmitter {
    fn emit(&self, event: &str, payload: &Value) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Handle::try_current()?;

        let body = json!({
            "event": event,
            "payload": payload,
            "timestamp": Utc::now().to_rfc3339()
        });
        let request = self.client.post(&self.url).json(&body);

        runtime.spawn(async move {
            match request.send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        trace!("webhook accepted event");
                    } else {
                        error!("Webhook push failed with status: {}", response.status());
                    }
                }
                Err(e) => {
                    error!("Failed to push event to webhook: {}", e);
                }
            }
        });

        Ok(())
    }
}

/// Sends every event to each inner emitter
///
/// A failing emitter does not keep the others from being called; the first
/// error is reported.
pub struct FanoutEmitter {
    emitters: Vec<Box<dyn Emitter>>,
}

impl FanoutEmitter {
    pub fn new(emitters: Vec<Box<dyn Emitter>>) -> Self {
        Self { emitters }
    }
}

impl Emitter for FanoutEmitter {
    fn emit(&self, event: &str, payload: &Value) -> anyhow::Result<()> {
        let mut first_error = None;
        for emitter in &self.emitters {
            if let Err(e) = emitter.emit(event, payload) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
