//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::AuthorizationStatus;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Label attached to exported metrics
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "geofence".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Maximum number of concurrently monitored regions
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Radius used when a region is created without one (meters)
    #[serde(default = "default_radius_m")]
    pub default_radius_m: f64,
    /// Bounded signal channel size (location source -> monitor)
    #[serde(default = "default_signal_buffer")]
    pub signal_buffer: usize,
    /// Bounded command channel size (handles -> monitor)
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_capacity() -> usize {
    20
}

fn default_radius_m() -> f64 {
    200.0
}

fn default_signal_buffer() -> usize {
    1000
}

fn default_command_buffer() -> usize {
    64
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            default_radius_m: default_radius_m(),
            signal_buffer: default_signal_buffer(),
            command_buffer: default_command_buffer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// JSONL script replayed by the location source
    #[serde(default = "default_script")]
    pub script: String,
    /// Minimum movement between delivered fixes (meters, 0 disables)
    #[serde(default = "default_distance_filter_m")]
    pub distance_filter_m: f64,
    /// Region limit enforced by the platform side of the source
    #[serde(default = "default_capacity")]
    pub platform_region_limit: usize,
    #[serde(default = "default_monitoring_available")]
    pub monitoring_available: bool,
    /// Authorization status reported before any change signal
    #[serde(default = "default_initial_authorization")]
    pub initial_authorization: AuthorizationStatus,
}

fn default_script() -> String {
    "scripts/demo.jsonl".to_string()
}

fn default_distance_filter_m() -> f64 {
    100.0
}

fn default_monitoring_available() -> bool {
    true
}

fn default_initial_authorization() -> AuthorizationStatus {
    AuthorizationStatus::NotDetermined
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            script: default_script(),
            distance_filter_m: default_distance_filter_m(),
            platform_region_limit: default_capacity(),
            monitoring_available: default_monitoring_available(),
            initial_authorization: default_initial_authorization(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Zoom level used when following the device
    #[serde(default = "default_follow_zoom")]
    pub follow_zoom: f64,
    #[serde(default = "default_render_buffer")]
    pub buffer: usize,
}

fn default_follow_zoom() -> f64 {
    18.0
}

fn default_render_buffer() -> usize {
    256
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { follow_zoom: default_follow_zoom(), buffer: default_render_buffer() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Event table refresh cadence
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

fn default_refresh_secs() -> u64 {
    2
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { refresh_secs: default_refresh_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// HTTP display port (0 to disable)
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: default_http_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    capacity: usize,
    default_radius_m: f64,
    signal_buffer: usize,
    command_buffer: usize,
    script: String,
    distance_filter_m: f64,
    platform_region_limit: usize,
    monitoring_available: bool,
    initial_authorization: AuthorizationStatus,
    follow_zoom: f64,
    render_buffer: usize,
    display_refresh_secs: u64,
    http_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        // Channel sizes and tick intervals of zero would panic in tokio
        Self {
            site_id: toml_config.site.id,
            capacity: toml_config.monitoring.capacity,
            default_radius_m: toml_config.monitoring.default_radius_m,
            signal_buffer: toml_config.monitoring.signal_buffer.max(1),
            command_buffer: toml_config.monitoring.command_buffer.max(1),
            script: toml_config.location.script,
            distance_filter_m: toml_config.location.distance_filter_m,
            platform_region_limit: toml_config.location.platform_region_limit,
            monitoring_available: toml_config.location.monitoring_available,
            initial_authorization: toml_config.location.initial_authorization,
            follow_zoom: toml_config.render.follow_zoom,
            render_buffer: toml_config.render.buffer.max(1),
            display_refresh_secs: toml_config.display.refresh_secs.max(1),
            http_port: toml_config.http.port,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file,
        }
    }

    /// Determine config file path from an explicit argument or environment
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
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

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_radius_m(&self) -> f64 {
        self.default_radius_m
    }

    pub fn signal_buffer(&self) -> usize {
        self.signal_buffer
    }

    pub fn command_buffer(&self) -> usize {
        self.command_buffer
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn distance_filter_m(&self) -> f64 {
        self.distance_filter_m
    }

    pub fn platform_region_limit(&self) -> usize {
        self.platform_region_limit
    }

    pub fn monitoring_available(&self) -> bool {
        self.monitoring_available
    }

    pub fn initial_authorization(&self) -> AuthorizationStatus {
        self.initial_authorization
    }

    pub fn follow_zoom(&self) -> f64 {
        self.follow_zoom
    }

    pub fn render_buffer(&self) -> usize {
        self.render_buffer
    }

    pub fn display_refresh_secs(&self) -> u64 {
        self.display_refresh_secs
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override the replay script (from the command line)
    pub fn with_script(mut self, script: &str) -> Self {
        self.script = script.to_string();
        self
    }

    /// Override the HTTP port (from the command line)
    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    /// Builder method to set the monitoring capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}
