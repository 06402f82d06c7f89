use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use playspace_sync::chaperone::{BoundaryDistanceEngine, BoundaryEvent, BoundaryNotifier};
use playspace_sync::config::SyncConfig;
use playspace_sync::constants::protocol::DISCOVERY_PORT;
use playspace_sync::metrics::{self, Metrics};
use playspace_sync::net::{BoundarySyncServer, DiscoveryListener};
use playspace_sync::tracking::{BoundsSource, SharedRuntime, SimulatedRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => {}
        Some("probe") => return probe(args.next()).await,
        Some(other) => anyhow::bail!("Unknown command '{}' (expected 'probe [udp-port]')", other),
    }

    info!("Playspace Sync v{}", env!("CARGO_PKG_VERSION"));

    let config = SyncConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg).context("Invalid sync configuration")?;
    info!(
        "Configuration loaded: {}:{}, discovery to {}:{}",
        config.bind_address, config.tcp_port, config.broadcast_address, config.discovery_port
    );

    let metrics = Arc::new(Metrics::new());
    if let Some(port) = config.metrics_port {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    // No headset runtime bindings in this binary; the simulated runtime
    // keeps the same working/live semantics.
    let runtime: SharedRuntime = Arc::new(Mutex::new(SimulatedRuntime::new()));

    let engine = Arc::new(BoundaryDistanceEngine::new());
    if let Err(e) = engine.load_chaperone_data(&runtime, BoundsSource::Live) {
        warn!("Could not read the live boundary: {}", e);
    }

    let (notifier, events) = BoundaryNotifier::channel();
    spawn_event_logger(events);

    let mut server = BoundarySyncServer::new(
        config.clone(),
        runtime.clone(),
        engine.clone(),
        notifier,
        metrics.clone(),
    );
    server
        .initialize()
        .await
        .context("Failed to start boundary sync server")?;

    #[cfg(feature = "comfort")]
    let comfort_task = comfort_loop::spawn(runtime.clone(), engine.clone(), metrics.clone())?;

    tokio::signal::ctrl_c().await.context("Failed to install Ctrl+C handler")?;
    info!("Shutdown signal received");

    #[cfg(feature = "comfort")]
    comfort_task.abort();
    server.shutdown().await;

    info!("Server stopped");
    Ok(())
}

/// Stands in for the profile/geometry listener
fn spawn_event_logger(events: crossbeam_channel::Receiver<BoundaryEvent>) {
    let spawned = std::thread::Builder::new()
        .name("boundary-events".to_string())
        .spawn(move || {
            for event in events.iter() {
                match event {
                    BoundaryEvent::Committed { wall_count, play_area } => info!(
                        "Boundary changed: {} walls, play area {:.2} x {:.2}",
                        wall_count, play_area.0, play_area.1
                    ),
                    BoundaryEvent::Reset => info!("Boundary reset by peer"),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Boundary event logger not started: {}", e);
    }
}

/// Listens for one advertisement and prints the endpoint as JSON
async fn probe(port: Option<String>) -> anyhow::Result<()> {
    let port = match port {
        Some(port) => port.parse::<u16>().with_context(|| format!("Invalid UDP port '{}'", port))?,
        None => DISCOVERY_PORT,
    };

    let listener = DiscoveryListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).await?;
    info!("Waiting for a discovery advertisement on UDP {}", port);

    let (advertisement, from) = tokio::select! {
        received = listener.recv_advertisement() => received?,
        _ = tokio::signal::ctrl_c() => {
            info!("Probe cancelled");
            return Ok(());
        }
    };

    let report = serde_json::json!({
        "host": from.ip().to_string(),
        "tcp_port": advertisement.tcp_port,
        "advertisement": advertisement,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    debug!("Advertisement from {}", from);
    Ok(())
}

#[cfg(feature = "comfort")]
mod comfort_loop {
    use std::sync::Arc;
    use std::time::Instant;

    use tokio::task::JoinHandle;
    use tokio::time::{interval, MissedTickBehavior};
    use tracing::{debug, info};

    use playspace_sync::chaperone::BoundaryDistanceEngine;
    use playspace_sync::comfort::ComfortController;
    use playspace_sync::config::ComfortConfig;
    use playspace_sync::metrics::Metrics;
    use playspace_sync::tracking::SharedRuntime;

    /// Drives the comfort consumers at the configured tick rate
    pub fn spawn(
        runtime: SharedRuntime,
        engine: Arc<BoundaryDistanceEngine>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let config = ComfortConfig::load_or_default();
        config.validate().map_err(anyhow::Error::msg)?;
        info!(
            "Comfort tick at {} Hz (auto-turn {}, vestibular {}, ratchet {})",
            config.tick_rate, config.auto_turn_enabled, config.vestibular_enabled, config.ratchet_enabled
        );

        let mut controller = ComfortController::new(&config, engine).with_metrics(metrics);
        let period = config.tick_interval();

        Ok(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last = Instant::now();

            loop {
                ticker.tick().await;
                let now = Instant::now();
                let dt = now - last;
                last = now;

                let hmd = runtime.lock().hmd_pose();
                let output = controller.tick(&hmd, dt);
                if !output.is_idle() {
                    debug!("Comfort rotation {:?}", output);
                }
            }
        }))
    }
}
