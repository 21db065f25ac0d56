//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Base URL of the walking directions API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
    /// Minimum spacing between outgoing API requests
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Segment cache capacity (entries)
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_ms: default_request_timeout_ms(),
            min_request_interval_ms: default_min_request_interval_ms(),
            cache_size: default_cache_size(),
        }
    }
}

fn default_api_url() -> String {
    "https://routing.openstreetmap.de/routed-foot".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_min_request_interval_ms() -> u64 {
    1_000
}

fn default_cache_size() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuidanceSection {
    #[serde(default = "default_instruction_announce_m")]
    pub instruction_announce_m: f64,
    #[serde(default = "default_reroute_threshold_m")]
    pub reroute_threshold_m: f64,
    #[serde(default = "default_return_threshold_m")]
    pub return_threshold_m: f64,
    #[serde(default = "default_poi_reached_radius_m")]
    pub poi_reached_radius_m: f64,
    #[serde(default = "default_route_end_radius_m")]
    pub route_end_radius_m: f64,
    #[serde(default = "default_extended_reach_radius_m")]
    pub extended_reach_radius_m: f64,
    #[serde(default = "default_reach_safety_bound_m")]
    pub reach_safety_bound_m: f64,
    #[serde(default = "default_prefer_stored")]
    pub prefer_stored: bool,
    #[serde(default = "default_fallback_to_live")]
    pub fallback_to_live: bool,
    /// Guidance event channel capacity
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for GuidanceSection {
    fn default() -> Self {
        Self {
            instruction_announce_m: default_instruction_announce_m(),
            reroute_threshold_m: default_reroute_threshold_m(),
            return_threshold_m: default_return_threshold_m(),
            poi_reached_radius_m: default_poi_reached_radius_m(),
            route_end_radius_m: default_route_end_radius_m(),
            extended_reach_radius_m: default_extended_reach_radius_m(),
            reach_safety_bound_m: default_reach_safety_bound_m(),
            prefer_stored: default_prefer_stored(),
            fallback_to_live: default_fallback_to_live(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_instruction_announce_m() -> f64 {
    100.0
}

fn default_reroute_threshold_m() -> f64 {
    50.0
}

fn default_return_threshold_m() -> f64 {
    30.0
}

fn default_poi_reached_radius_m() -> f64 {
    30.0
}

fn default_route_end_radius_m() -> f64 {
    20.0
}

fn default_extended_reach_radius_m() -> f64 {
    120.0
}

fn default_reach_safety_bound_m() -> f64 {
    200.0
}

fn default_prefer_stored() -> bool {
    true
}

fn default_fallback_to_live() -> bool {
    true
}

fn default_event_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProximityConfig {
    /// One-time approaching alert distance
    #[serde(default = "default_approach_alert_m")]
    pub approach_alert_m: f64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self { approach_alert_m: default_approach_alert_m() }
    }
}

fn default_approach_alert_m() -> f64 {
    100.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted routes and tour progress
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: default_storage_dir() }
    }
}

fn default_storage_dir() -> String {
    "data".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TourConfig {
    /// JSON file with the POI list
    #[serde(default = "default_poi_file")]
    pub poi_file: String,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self { poi_file: default_poi_file() }
    }
}

fn default_poi_file() -> String {
    "config/pois.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Drive positions from a simulated walker instead of a live source
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_walk_speed_mps")]
    pub speed_mps: f64,
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            speed_mps: default_walk_speed_mps(),
            step_interval_ms: default_step_interval_ms(),
        }
    }
}

fn default_walk_speed_mps() -> f64 {
    1.4
}

fn default_step_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub guidance: GuidanceSection,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tour: TourConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    api_url: String,
    request_timeout_ms: u64,
    min_request_interval_ms: u64,
    cache_size: usize,
    instruction_announce_m: f64,
    reroute_threshold_m: f64,
    return_threshold_m: f64,
    poi_reached_radius_m: f64,
    route_end_radius_m: f64,
    extended_reach_radius_m: f64,
    reach_safety_bound_m: f64,
    prefer_stored: bool,
    fallback_to_live: bool,
    event_buffer: usize,
    approach_alert_m: f64,
    storage_dir: String,
    poi_file: String,
    simulation_enabled: bool,
    simulation_speed_mps: f64,
    simulation_step_interval_ms: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, source: &str) -> Self {
        Self {
            api_url: toml_config.routing.api_url,
            request_timeout_ms: toml_config.routing.timeout_ms,
            min_request_interval_ms: toml_config.routing.min_request_interval_ms,
            cache_size: toml_config.routing.cache_size,
            instruction_announce_m: toml_config.guidance.instruction_announce_m,
            reroute_threshold_m: toml_config.guidance.reroute_threshold_m,
            return_threshold_m: toml_config.guidance.return_threshold_m,
            poi_reached_radius_m: toml_config.guidance.poi_reached_radius_m,
            route_end_radius_m: toml_config.guidance.route_end_radius_m,
            extended_reach_radius_m: toml_config.guidance.extended_reach_radius_m,
            reach_safety_bound_m: toml_config.guidance.reach_safety_bound_m,
            prefer_stored: toml_config.guidance.prefer_stored,
            fallback_to_live: toml_config.guidance.fallback_to_live,
            event_buffer: toml_config.guidance.event_buffer,
            approach_alert_m: toml_config.proximity.approach_alert_m,
            storage_dir: toml_config.storage.dir,
            poi_file: toml_config.tour.poi_file,
            simulation_enabled: toml_config.simulation.enabled,
            simulation_speed_mps: toml_config.simulation.speed_mps,
            simulation_step_interval_ms: toml_config.simulation.step_interval_ms,
            config_file: source.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        let config_path = Self::resolve_config_path(args);
        Self::load_from_path(&config_path)
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    pub fn min_request_interval_ms(&self) -> u64 {
        self.min_request_interval_ms
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn instruction_announce_m(&self) -> f64 {
        self.instruction_announce_m
    }

    pub fn reroute_threshold_m(&self) -> f64 {
        self.reroute_threshold_m
    }

    pub fn return_threshold_m(&self) -> f64 {
        self.return_threshold_m
    }

    pub fn poi_reached_radius_m(&self) -> f64 {
        self.poi_reached_radius_m
    }

    pub fn route_end_radius_m(&self) -> f64 {
        self.route_end_radius_m
    }

    pub fn extended_reach_radius_m(&self) -> f64 {
        self.extended_reach_radius_m
    }

    pub fn reach_safety_bound_m(&self) -> f64 {
        self.reach_safety_bound_m
    }

    pub fn prefer_stored(&self) -> bool {
        self.prefer_stored
    }

    pub fn fallback_to_live(&self) -> bool {
        self.fallback_to_live
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    pub fn approach_alert_m(&self) -> f64 {
        self.approach_alert_m
    }

    pub fn storage_dir(&self) -> &str {
        &self.storage_dir
    }

    pub fn poi_file(&self) -> &str {
        &self.poi_file
    }

    pub fn simulation_enabled(&self) -> bool {
        self.simulation_enabled
    }

    pub fn simulation_speed_mps(&self) -> f64 {
        self.simulation_speed_mps
    }

    pub fn simulation_step_interval_ms(&self) -> u64 {
        self.simulation_step_interval_ms
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
