//! navtel-replay - drive the telemetry coordinator from a recorded engine log
//!
//! Replays JSONL engine inputs (routes, locations, progress, off-route,
//! session state, feedback) and writes the resulting analytics events to the
//! egress file, and to MQTT when enabled.
//!
//! Module structure:
//! - `domain/` - Engine inputs and analytics event payloads
//! - `io/` - Reporter sinks, egress, engine observer hub, replay input
//! - `services/` - Coordinator, dispatcher, assembler, gate, buffers
//! - `infra/` - Infrastructure (Config, Metrics, errors)

use anyhow::Context;
use clap::Parser;
use nav_telemetry::infra::{Config, Metrics};
use nav_telemetry::io::{
    create_egress_channel, read_replay, Egress, FanoutReporter, MqttPublisher, ObserverHub,
    Replayer, TelemetryReporter,
};
use nav_telemetry::services::TelemetryCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Replay recorded navigation engine inputs through the telemetry coordinator
#[derive(Parser, Debug)]
#[command(name = "navtel-replay", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// JSONL file of recorded engine inputs
    #[arg(short, long)]
    input: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

fn init_logging(json: bool) {
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json);

    info!("navtel-replay starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        sdk = %config.sdk_identifier(),
        buffer_size = %config.location_buffer_size(),
        reroute_timeout_secs = %config.reroute_timeout().map(|d| d.as_secs()).unwrap_or_default(),
        egress_file = %config.egress_file(),
        mqtt_enabled = %config.mqtt_enabled(),
        "config_loaded"
    );

    let records = read_replay(&args.input)
        .with_context(|| format!("Failed to load replay input {}", args.input))?;
    info!(records = %records.len(), input = %args.input, "replay_loaded");

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(Metrics::new());

    // File egress
    let (file_sender, file_rx) =
        create_egress_channel(config.egress_channel_size(), metrics.clone(), "file");
    let egress = Egress::new(config.egress_file());
    let egress_task = tokio::spawn(egress.run(file_rx));
    let mut reporter = FanoutReporter::new().with(Arc::new(file_sender));

    // MQTT egress (if enabled)
    let mqtt_task = if config.mqtt_enabled() {
        let (mqtt_sender, mqtt_rx) =
            create_egress_channel(config.egress_channel_size(), metrics.clone(), "mqtt");
        let publisher = MqttPublisher::new(&config, mqtt_rx);
        reporter = reporter.with(Arc::new(mqtt_sender));
        Some(tokio::spawn(publisher.run(shutdown.clone())))
    } else {
        None
    };

    // Periodic counter summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = metrics_shutdown.cancelled() => return,
                _ = interval.tick() => metrics_clone.report().log(),
            }
        }
    });

    let coordinator = Arc::new(TelemetryCoordinator::new(metrics.clone()));
    let reporter: Arc<dyn TelemetryReporter> = Arc::new(reporter);
    coordinator.initialize(config.clone(), reporter)?;

    let hub = Arc::new(ObserverHub::new());
    hub.register(coordinator.clone());

    // Handle shutdown on Ctrl+C
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        signal_shutdown.cancel();
    });

    let replayer = Replayer::new(hub.clone(), coordinator.clone());
    replayer.run(records, shutdown.clone()).await;

    // Let the last inputs settle before tearing the session down
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.shutdown();
    shutdown.cancel();

    // Dropping every reporter handle closes the egress channels
    drop(replayer);
    drop(hub);
    drop(coordinator);

    match tokio::time::timeout(Duration::from_secs(5), egress_task).await {
        Ok(Ok(written)) => info!(written = %written, "egress_drained"),
        Ok(Err(e)) => warn!(error = %e, "egress_task_failed"),
        Err(_) => warn!("egress_drain_timeout"),
    }
    if let Some(task) = mqtt_task {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            warn!("mqtt_egress_drain_timeout");
        }
    }

    metrics.report().log();
    info!("navtel-replay shutdown complete");
    Ok(())
}
