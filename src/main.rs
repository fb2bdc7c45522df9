//! Geofence monitor - region transition recorder
//!
//! Tracks a bounded set of circular regions, records the enter/exit/failure
//! signals a location source reports for them, and follows the device
//! position on a rendering collaborator.
//!
//! Module structure:
//! - `domain/` - Core types (GeoRegion, Position, MonitoringEvent)
//! - `io/` - Collaborators (location source, replay, render, display, HTTP)
//! - `services/` - Monitor, RegionRegistry, EventLog, PositionTracker
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use geofence_monitor::infra::{Config, Metrics};
use geofence_monitor::io::display::run_event_table;
use geofence_monitor::io::http::{start_http_server, HttpState};
use geofence_monitor::io::render::run_render_worker;
use geofence_monitor::io::{create_render_channel, create_signal_channel, load_script, ReplaySource};
use geofence_monitor::services::{Monitor, MonitorHandle};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence monitor - records region transitions from a location source
#[derive(Parser, Debug)]
#[command(name = "geofence-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Replay script (JSONL), overrides the configured one
    #[arg(short, long)]
    script: Option<String>,

    /// HTTP port, 0 disables the endpoint
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for render and filter visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "geofence-monitor starting");

    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let mut config = Config::load_from_path(&config_path);
    if let Some(script) = args.script.as_deref() {
        config = config.with_script(script);
    }
    if let Some(port) = args.http_port {
        config = config.with_http_port(port);
    }

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        capacity = %config.capacity(),
        default_radius_m = %config.default_radius_m(),
        script = %config.script(),
        platform_region_limit = %config.platform_region_limit(),
        initial_authorization = %config.initial_authorization().as_str(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());

    // Rendering collaborator
    let (render, render_rx) = create_render_channel(config.render_buffer(), metrics.clone());
    let render_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        run_render_worker(render_rx, render_shutdown).await;
    });

    // Signal and command channels (bounded for backpressure)
    let (signal_tx, signal_rx) = create_signal_channel(config.signal_buffer(), metrics.clone());
    let (handle, command_rx) = MonitorHandle::channel(config.command_buffer());

    let source = Arc::new(ReplaySource::new(&config));
    let mut monitor = Monitor::new(&config, source.clone(), Arc::new(render), metrics.clone());
    monitor.start();

    // Start HTTP endpoint (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let state = Arc::new(HttpState {
            site_id: config.site_id().to_string(),
            events: monitor.log_reader(),
            regions: monitor.registry_view(),
            position: monitor.subscribe_position(),
            metrics: metrics.clone(),
            handle: handle.clone(),
            default_radius_m: config.default_radius_m(),
        });
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(http_port, state, http_shutdown).await {
                error!(error = %e, "HTTP server error");
            }
        });
    }

    // Event table display
    let table_reader = monitor.log_reader();
    let table_regions = monitor.registry_view();
    let table_refresh = config.display_refresh_secs();
    let table_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        run_event_table(table_reader, table_regions, table_refresh, table_shutdown).await;
    });

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_reader = monitor.log_reader();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let summary = metrics_clone.report(metrics_reader.count());
            summary.log();
        }
    });

    // Replay the location script
    match load_script(config.script()) {
        Ok(entries) => {
            let replay_signals = signal_tx.clone();
            let replay_handle = handle.clone();
            let default_radius_m = config.default_radius_m();
            let replay_shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                source
                    .run(entries, replay_signals, replay_handle, default_radius_m, replay_shutdown)
                    .await;
            });
        }
        Err(e) => error!(error = %e, "replay_script_unavailable"),
    }

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run monitor - consumes signals and commands until shutdown. `signal_tx`
    // stays alive here so the monitor keeps serving HTTP commands after the
    // script ends.
    monitor.run(signal_rx, command_rx, shutdown_rx).await;
    drop(signal_tx);

    info!("geofence-monitor shutdown complete");
    Ok(())
}
