//! Walkguide - pedestrian tour guidance and routing engine
//!
//! Guides a walker through an ordered sequence of points of interest,
//! computing walking routes with cached segments and offline fallback,
//! and emitting guidance events for a presentation layer to render.
//!
//! Module structure:
//! - `domain/` - Core types (Coordinate, Poi, Route)
//! - `io/` - External interfaces (routing API, storage backend, position feed)
//! - `services/` - Guidance logic (Coordinator, Navigation, RouteProvider)
//! - `infra/` - Infrastructure (Config)

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use walkguide::domain::poi::{Poi, TourSequence};
use walkguide::infra::Config;
use walkguide::io::{create_guidance_channel, FileBackend, HttpRoutingApi, SimulatedWalker};
use walkguide::services::navigation::NavigationConfig;
use walkguide::services::route_provider::RouteProviderConfig;
use walkguide::services::{
    GuidanceConfig, GuidanceCoordinator, GuidanceRequest, NavigationEngine, RouteProvider,
    RouteStore, StoredRouteResolver, TourProgressTracker,
};

/// Walkguide - pedestrian tour guidance engine
#[derive(Parser, Debug)]
#[command(name = "walkguide", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("walkguide starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        api_url = %config.api_url(),
        storage_dir = %config.storage_dir(),
        poi_file = %config.poi_file(),
        reroute_threshold_m = %config.reroute_threshold_m(),
        simulation = %config.simulation_enabled(),
        "config_loaded"
    );

    // POIs are immutable reference data, loaded once
    let pois = Poi::load_from_file(config.poi_file())?;
    let sequence = TourSequence::new(pois.clone());
    info!(pois = sequence.len(), "pois_loaded");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared storage backend for routes and tour progress
    let backend = Arc::new(FileBackend::new(config.storage_dir())?);

    // Routing stack: HTTP API -> provider (cache + fallback) -> resolver
    let api = Arc::new(HttpRoutingApi::new(
        config.api_url(),
        Duration::from_millis(config.request_timeout_ms()),
    ));
    let provider = Arc::new(RouteProvider::new(
        api,
        RouteProviderConfig {
            cache_capacity: config.cache_size(),
            min_request_interval: Duration::from_millis(config.min_request_interval_ms()),
        },
    ));
    let store = RouteStore::new(backend.clone());
    let resolver = StoredRouteResolver::new(store, provider.clone());

    let nav = NavigationEngine::new(
        provider.clone(),
        NavigationConfig {
            instruction_announce_m: config.instruction_announce_m(),
            reroute_threshold_m: config.reroute_threshold_m(),
        },
    );
    let progress =
        TourProgressTracker::new(pois.clone(), backend, config.approach_alert_m());

    // Guidance events go to the presentation layer; here a logger task
    // stands in for it
    let (events, mut event_rx) = create_guidance_channel(config.event_buffer());
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let payload = serde_json::to_string(&event).unwrap_or_default();
            info!(event = %event.name(), payload = %payload, "guidance_event");
        }
    });

    let guidance_config = GuidanceConfig {
        poi_reached_radius_m: config.poi_reached_radius_m(),
        route_end_radius_m: config.route_end_radius_m(),
        extended_reach_radius_m: config.extended_reach_radius_m(),
        reach_safety_bound_m: config.reach_safety_bound_m(),
        return_threshold_m: config.return_threshold_m(),
        prefer_stored: config.prefer_stored(),
        fallback_to_live: config.fallback_to_live(),
    };
    let mut coordinator =
        GuidanceCoordinator::new(resolver, provider, nav, progress, events, guidance_config);

    // Position feed (bounded for backpressure)
    let (position_tx, position_rx) = mpsc::channel(64);

    if config.simulation_enabled() {
        let path: Vec<_> = sequence.pois().iter().map(|p| p.coordinate).collect();
        let walker = SimulatedWalker::new(
            path,
            config.simulation_speed_mps(),
            Duration::from_millis(config.simulation_step_interval_ms()),
        );
        let walker_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            walker.run(position_tx, walker_shutdown).await;
        });
    }

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    coordinator.start(GuidanceRequest::GuidedTour { sequence }).await?;

    // Consume positions until the feed closes or shutdown is signaled
    coordinator.run(position_rx, shutdown_rx).await;

    info!("walkguide shutdown complete");
    Ok(())
}
