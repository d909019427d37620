//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::store::DriverEntry;
use crate::domain::types::RoadCategory;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Topic carrying batched telemetry (control markers and points)
    #[serde(default = "default_telemetry_topic")]
    pub telemetry_topic: String,
    /// Topic filter for device boot announcements
    #[serde(default = "default_boot_topic")]
    pub boot_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            telemetry_topic: default_telemetry_topic(),
            boot_topic: default_boot_topic(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_telemetry_topic() -> String {
    "telemetry/batch".to_string()
}

fn default_boot_topic() -> String {
    "telemetry/+/boot".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationsConfig {
    /// Per-device topics are `<prefix>/<device_id>/confirmation` and
    /// `<prefix>/<device_id>/config`
    #[serde(default = "default_confirmation_prefix")]
    pub topic_prefix: String,
}

impl Default for ConfirmationsConfig {
    fn default() -> Self {
        Self { topic_prefix: default_confirmation_prefix() }
    }
}

fn default_confirmation_prefix() -> String {
    "device".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            reap_interval_secs: default_reap_interval_secs(),
            idle_threshold_secs: default_idle_threshold_secs(),
        }
    }
}

fn default_reap_interval_secs() -> u64 {
    300
}

fn default_idle_threshold_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoadsConfig {
    #[serde(default = "default_overpass_url")]
    pub overpass_url: String,
    /// Search radius around a fix when looking up the nearest road
    #[serde(default = "default_search_radius_m")]
    pub search_radius_m: u32,
    #[serde(default = "default_lookup_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum cached grid cells before eviction kicks in
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for RoadsConfig {
    fn default() -> Self {
        Self {
            overpass_url: default_overpass_url(),
            search_radius_m: default_search_radius_m(),
            timeout_ms: default_lookup_timeout_ms(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api/interpreter".to_string()
}

fn default_search_radius_m() -> u32 {
    20
}

fn default_lookup_timeout_ms() -> u64 {
    10_000
}

fn default_cache_capacity() -> usize {
    4096
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSONL journal for derived events
    #[serde(default = "default_events_file")]
    pub events_file: String,
    /// JSONL journal for raw points
    #[serde(default = "default_points_file")]
    pub points_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { events_file: default_events_file(), points_file: default_points_file() }
    }
}

fn default_events_file() -> String {
    "data/events.jsonl".to_string()
}

fn default_points_file() -> String {
    "data/points.jsonl".to_string()
}

/// Known vehicles and drivers, seeded into the store at startup
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FleetConfig {
    #[serde(default)]
    pub vehicles: Vec<String>,
    #[serde(default)]
    pub drivers: Vec<DriverEntry>,
}

/// Per-vehicle speed limit override for one road category
#[derive(Debug, Clone, Deserialize)]
pub struct LimitOverride {
    pub vehicle_id: String,
    pub road_type: RoadCategory,
    pub speed_limit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub confirmations: ConfirmationsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub roads: RoadsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub limits: Vec<LimitOverride>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    mqtt: MqttConfig,
    confirmations: ConfirmationsConfig,
    sessions: SessionsConfig,
    roads: RoadsConfig,
    metrics: MetricsConfig,
    storage: StorageConfig,
    fleet: FleetConfig,
    limits: Vec<LimitOverride>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            confirmations: ConfirmationsConfig::default(),
            sessions: SessionsConfig::default(),
            roads: RoadsConfig::default(),
            metrics: MetricsConfig::default(),
            storage: StorageConfig::default(),
            fleet: FleetConfig::default(),
            limits: Vec::new(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
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

        Ok(Self {
            mqtt: toml_config.mqtt,
            confirmations: toml_config.confirmations,
            sessions: toml_config.sessions,
            roads: toml_config.roads,
            metrics: toml_config.metrics,
            storage: toml_config.storage,
            fleet: toml_config.fleet,
            limits: toml_config.limits,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path - falls back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    // Getters

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt.host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt.port
    }

    pub fn telemetry_topic(&self) -> &str {
        &self.mqtt.telemetry_topic
    }

    pub fn boot_topic(&self) -> &str {
        &self.mqtt.boot_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt.username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt.password.as_deref()
    }

    pub fn confirmation_topic_prefix(&self) -> &str {
        &self.confirmations.topic_prefix
    }

    pub fn reap_interval_secs(&self) -> u64 {
        self.sessions.reap_interval_secs
    }

    pub fn idle_threshold_secs(&self) -> u64 {
        self.sessions.idle_threshold_secs
    }

    pub fn overpass_url(&self) -> &str {
        &self.roads.overpass_url
    }

    pub fn road_search_radius_m(&self) -> u32 {
        self.roads.search_radius_m
    }

    pub fn road_lookup_timeout_ms(&self) -> u64 {
        self.roads.timeout_ms
    }

    pub fn road_cache_capacity(&self) -> usize {
        self.roads.cache_capacity
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics.interval_secs
    }

    pub fn events_file(&self) -> &str {
        &self.storage.events_file
    }

    pub fn points_file(&self) -> &str {
        &self.storage.points_file
    }

    pub fn vehicles(&self) -> &[String] {
        &self.fleet.vehicles
    }

    pub fn drivers(&self) -> &[DriverEntry] {
        &self.fleet.drivers
    }

    pub fn limit_overrides(&self) -> &[LimitOverride] {
        &self.limits
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.telemetry_topic(), "telemetry/batch");
        assert_eq!(config.boot_topic(), "telemetry/+/boot");
        assert_eq!(config.confirmation_topic_prefix(), "device");
        assert_eq!(config.reap_interval_secs(), 300);
        assert_eq!(config.idle_threshold_secs(), 3600);
        assert_eq!(config.road_search_radius_m(), 20);
        assert_eq!(config.road_cache_capacity(), 4096);
        assert!(config.vehicles().is_empty());
        assert!(config.limit_overrides().is_empty());
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["fleet-telemetry".to_string()];
        // CONFIG_FILE may leak from the environment; only assert when unset
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "fleet-telemetry".to_string(),
            "--config".to_string(),
            "config/prod.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/prod.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["fleet-telemetry".to_string(), "--config=config/staging.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/staging.toml");
    }

    #[test]
    fn test_limit_override_parsing() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [[limits]]
            vehicle_id = "veh-001"
            road_type = "National Highways"
            speed_limit = 70.0
            "#,
        )
        .unwrap();

        assert_eq!(toml_config.limits.len(), 1);
        assert_eq!(toml_config.limits[0].road_type, RoadCategory::NationalHighways);
        assert_eq!(toml_config.limits[0].speed_limit, 70.0);
    }
}
