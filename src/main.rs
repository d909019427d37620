//! fleet-telemetry - batched vehicle telemetry ingestion service
//!
//! Reassembles START/END-bounded point batches into sessions, derives
//! harsh-driving and overspeeding events on close, accumulates distance,
//! and confirms each close back to the device.
//!
//! Module structure:
//! - `domain/` - Core business types (Session, GpsPoint, records, store trait)
//! - `io/` - External interfaces (MQTT ingest, notifier, Overpass, store)
//! - `services/` - Business logic (Ingestor, SessionManager, detection)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use fleet_telemetry::infra::{Config, Metrics};
use fleet_telemetry::io::{MemoryStore, MqttNotifier, OverpassClient};
use fleet_telemetry::services::Ingestor;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Fleet telemetry - batched GPS session ingestion and event derivation
#[derive(Parser, Debug)]
#[command(name = "fleet-telemetry", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full message visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git = env!("GIT_HASH"), "fleet-telemetry starting");

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        telemetry_topic = %config.telemetry_topic(),
        boot_topic = %config.boot_topic(),
        reap_interval_secs = %config.reap_interval_secs(),
        idle_threshold_secs = %config.idle_threshold_secs(),
        road_cache_capacity = %config.road_cache_capacity(),
        vehicles = %config.vehicles().len(),
        drivers = %config.drivers().len(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(MemoryStore::from_config(&config));
    let lookup = Arc::new(OverpassClient::new(&config));
    let notifier = Arc::new(MqttNotifier::new(&config));

    // Create message channel (bounded for backpressure)
    let (message_tx, message_rx) = mpsc::channel(1000);

    // Start MQTT telemetry client
    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = fleet_telemetry::io::mqtt::start_telemetry_client(
            &mqtt_config,
            message_tx,
            mqtt_metrics,
            mqtt_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "telemetry client error");
        }
    });

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run ingestor - consumes messages until channel closes
    let mut ingestor = Ingestor::new(&config, store, lookup, notifier, metrics);
    info!("ingestor_started");
    ingestor.run(message_rx, shutdown_rx).await;

    info!("fleet-telemetry shutdown complete");
    Ok(())
}
