use std::sync::Arc;

use clap::Parser;
use netpulse::{
    MonitorBuilder,
    alerts::emitter::{BroadcastEmitter, Emitter, FanoutEmitter, WebhookEmitter},
    config::{MonitorConfig, read_config_file},
    util::apply_env_overrides,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON); built-in defaults if omitted
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("netpulse", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => {
            let mut config = MonitorConfig::default();
            apply_env_overrides(&mut config);
            config
        }
    };

    let live = BroadcastEmitter::new(256);
    let mut emitters: Vec<Box<dyn Emitter>> = vec![Box::new(live.clone())];
    if let Some(webhook) = &config.webhook {
        debug!("pushing events to {}", webhook.url);
        emitters.push(Box::new(WebhookEmitter::new(&webhook.url)));
    }

    let monitor = MonitorBuilder::new(config)
        .emitter(Arc::new(FanoutEmitter::new(emitters)))
        .spawn()?;

    // log pushed events so a bare run shows what subscribers would see
    let mut events = live.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => trace!("{}: {}", event.event, event.payload),
                Err(RecvError::Lagged(skipped)) => debug!("event log lagged by {skipped}"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");

    if let Err(e) = monitor.shutdown().await {
        warn!("shutdown incomplete: {e:#}");
    }

    Ok(())
}
