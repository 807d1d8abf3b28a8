//! Childguard - room controller that keeps young children away from a
//! switched appliance
//!
//! Module structure:
//! - `domain/` - Core types (door states, occupancy, commands) and the clock
//! - `io/` - External interfaces (sensor MQTT, notifier, Prometheus)
//! - `services/` - Room logic (door detector, occupancy, safety, controller, actuator)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use childguard::domain::clock::{Clock, SystemClock};
use childguard::infra::{Config, Metrics};
use childguard::io::{create_notify_channel, create_status_channel, MqttNotifier, SensorSignals};
use childguard::services::{build_actuator, create_actuator_worker, Actuator, Controller};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Childguard - child-safety room controller
#[derive(Parser, Debug)]
#[command(name = "childguard", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

const ACTUATOR_QUEUE_SIZE: usize = 16;
const NOTIFY_QUEUE_SIZE: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Structured logging, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "childguard starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    if config.broker_enabled() {
        childguard::infra::broker::start_embedded_broker(&config)?;
    }

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        actuator_mode = %config.actuator_mode().as_str(),
        direction_sensor = %config.direction_sensor_enabled(),
        tick_ms = %config.tick_interval().as_millis(),
        notifications = %config.notifications_enabled(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let signals = Arc::new(SensorSignals::new());

    // Sensor edges from the monitors
    let sensor_config = config.clone();
    let sensor_signals = signals.clone();
    let sensor_metrics = metrics.clone();
    let sensor_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = childguard::io::sensor_mqtt::start_sensor_client(
            &sensor_config,
            sensor_signals,
            sensor_metrics,
            sensor_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "sensor_mqtt_client_error");
        }
    });

    // Notifications and status go out through one MQTT publisher
    let (notify_sender, notify_rx) = create_notify_channel(NOTIFY_QUEUE_SIZE, metrics.clone());
    let notifier = MqttNotifier::new(&config, notify_rx, metrics.clone());
    let notifier_shutdown = shutdown_rx.clone();
    let notifier_handle = tokio::spawn(async move {
        notifier.run(notifier_shutdown).await;
    });

    // The appliance is assumed on until the first acknowledgement says otherwise
    let (status_tx, status_rx) = create_status_channel(config.site_id(), true);

    let actuator = build_actuator(config.actuator())?;
    info!(actuator = %actuator.name(), "actuator_ready");
    let (cmd_tx, ack_rx, worker) =
        create_actuator_worker(actuator, metrics.clone(), ACTUATOR_QUEUE_SIZE, true);
    tokio::spawn(worker.run());

    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_status = status_rx.clone();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = childguard::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_status,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "prometheus_metrics_server_error");
            }
        });
    }

    // Periodic metrics summary
    let report_metrics = metrics.clone();
    let report_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(report_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            report_metrics.report().log();
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut controller = Controller::new(
        config,
        metrics,
        cmd_tx,
        ack_rx,
        Some(notify_sender),
        status_tx,
        clock.now(),
    );
    controller.startup();

    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    let started = Instant::now();
    controller.run(signals, clock, shutdown_rx).await;

    // Dropping the controller closes the notify channel so the notifier can drain
    drop(controller);
    let _ = notifier_handle.await;

    info!(uptime_secs = %started.elapsed().as_secs(), "childguard shutdown complete");
    Ok(())
}
