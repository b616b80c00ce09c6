//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::event::{PhoneState, UNKNOWN};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    #[serde(default = "default_sdk_identifier")]
    pub identifier: String,
    #[serde(default = "default_sdk_version")]
    pub version: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            identifier: default_sdk_identifier(),
            version: default_sdk_version(),
            user_id: default_user_id(),
        }
    }
}

fn default_sdk_identifier() -> String {
    "nav-telemetry".to_string()
}

fn default_sdk_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Location fixes kept for before/after event context
    #[serde(default = "default_location_buffer_size")]
    pub location_buffer_size: usize,
    /// How long a reroute waits for the replacement route (0 = forever)
    #[serde(default = "default_reroute_timeout_secs")]
    pub reroute_timeout_secs: u64,
    /// Log a heartbeat every N tracking progress updates
    #[serde(default = "default_heartbeat_log_every")]
    pub heartbeat_log_every: u64,
    /// Emit the app turnstile event on initialize
    #[serde(default = "default_send_turnstile")]
    pub send_turnstile: bool,
    /// Bounded egress channel size
    #[serde(default = "default_egress_channel_size")]
    pub egress_channel_size: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            location_buffer_size: default_location_buffer_size(),
            reroute_timeout_secs: default_reroute_timeout_secs(),
            heartbeat_log_every: default_heartbeat_log_every(),
            send_turnstile: default_send_turnstile(),
            egress_channel_size: default_egress_channel_size(),
        }
    }
}

fn default_location_buffer_size() -> usize {
    20
}

fn default_reroute_timeout_secs() -> u64 {
    30
}

fn default_heartbeat_log_every() -> u64 {
    30
}

fn default_send_turnstile() -> bool {
    true
}

fn default_egress_channel_size() -> usize {
    1000
}

/// Static phone state used when the host does not supply its own provider
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_operating_system")]
    pub operating_system: String,
    #[serde(default = "default_unknown_level")]
    pub battery_level: i32,
    #[serde(default)]
    pub battery_plugged_in: bool,
    #[serde(default = "default_unknown_str")]
    pub connectivity: String,
    #[serde(default = "default_unknown_str")]
    pub audio_type: String,
    #[serde(default = "default_application_state")]
    pub application_state: String,
    #[serde(default = "default_unknown_level")]
    pub volume_level: i32,
    #[serde(default = "default_unknown_level")]
    pub screen_brightness: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            operating_system: default_operating_system(),
            battery_level: UNKNOWN,
            battery_plugged_in: false,
            connectivity: default_unknown_str(),
            audio_type: default_unknown_str(),
            application_state: default_application_state(),
            volume_level: UNKNOWN,
            screen_brightness: UNKNOWN,
        }
    }
}

fn default_device() -> String {
    "unknown".to_string()
}

fn default_operating_system() -> String {
    env::consts::OS.to_string()
}

fn default_unknown_level() -> i32 {
    UNKNOWN
}

fn default_unknown_str() -> String {
    "unknown".to_string()
}

fn default_application_state() -> String {
    "foreground".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for event egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "events.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic: default_mqtt_topic(),
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

fn default_mqtt_topic() -> String {
    "navigation/events".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub sdk: SdkConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    sdk_identifier: String,
    sdk_version: String,
    user_id: String,
    location_buffer_size: usize,
    reroute_timeout_secs: u64,
    heartbeat_log_every: u64,
    send_turnstile: bool,
    egress_channel_size: usize,
    device: DeviceConfig,
    egress_file: String,
    mqtt_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig {
            sdk: SdkConfig::default(),
            telemetry: TelemetryConfig::default(),
            device: DeviceConfig::default(),
            egress: EgressConfig::default(),
            mqtt: MqttConfig::default(),
            metrics: MetricsConfig::default(),
        }, "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            sdk_identifier: toml_config.sdk.identifier,
            sdk_version: toml_config.sdk.version,
            user_id: toml_config.sdk.user_id,
            // A zero-sized buffer would make every capture window fire empty
            location_buffer_size: toml_config.telemetry.location_buffer_size.max(1),
            reroute_timeout_secs: toml_config.telemetry.reroute_timeout_secs,
            heartbeat_log_every: toml_config.telemetry.heartbeat_log_every.max(1),
            send_turnstile: toml_config.telemetry.send_turnstile,
            egress_channel_size: toml_config.telemetry.egress_channel_size.max(1),
            device: toml_config.device,
            egress_file: toml_config.egress.file,
            mqtt_enabled: toml_config.mqtt.enabled,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
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

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

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

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Phone state described by the `[device]` section
    pub fn static_phone_state(&self) -> PhoneState {
        PhoneState {
            device: self.device.device.clone(),
            operating_system: self.device.operating_system.clone(),
            battery_level: self.device.battery_level,
            battery_plugged_in: self.device.battery_plugged_in,
            connectivity: self.device.connectivity.clone(),
            audio_type: self.device.audio_type.clone(),
            application_state: self.device.application_state.clone(),
            volume_level: self.device.volume_level,
            screen_brightness: self.device.screen_brightness,
        }
    }

    pub fn sdk_identifier(&self) -> &str {
        &self.sdk_identifier
    }

    pub fn sdk_version(&self) -> &str {
        &self.sdk_version
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn location_buffer_size(&self) -> usize {
        self.location_buffer_size
    }

    /// None means the reroute route-await never times out
    pub fn reroute_timeout(&self) -> Option<Duration> {
        (self.reroute_timeout_secs > 0).then(|| Duration::from_secs(self.reroute_timeout_secs))
    }

    pub fn heartbeat_log_every(&self) -> u64 {
        self.heartbeat_log_every
    }

    pub fn send_turnstile(&self) -> bool {
        self.send_turnstile
    }

    pub fn egress_channel_size(&self) -> usize {
        self.egress_channel_size
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the location buffer size
    pub fn with_location_buffer_size(mut self, size: usize) -> Self {
        self.location_buffer_size = size.max(1);
        self
    }

    /// Builder method to set the reroute timeout (0 disables it)
    pub fn with_reroute_timeout_secs(mut self, secs: u64) -> Self {
        self.reroute_timeout_secs = secs;
        self
    }

    /// Builder method to enable or disable the turnstile event
    pub fn with_send_turnstile(mut self, enabled: bool) -> Self {
        self.send_turnstile = enabled;
        self
    }
}
