//! Configuration loading and parsing

use anyhow::{Context, Result};
use meter_sniffer_decoder::registers::meter;
use meter_sniffer_decoder::{DecoderConfig, RegisterDescriptor, RegisterMap};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
///
/// Every section is optional; an empty file gives the built-in defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    /// Custom register table (default: the built-in meter table)
    #[serde(default)]
    pub registers: Vec<RegisterDescriptor>,
    #[serde(default)]
    pub output: OutputConfig,
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// How long one read waits before the line counts as idle
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_read_size")]
    pub read_size: usize,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_read_timeout() -> u64 {
    100
}

fn default_read_size() -> usize {
    256
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: ParityConfig::default(),
            stop_bits: default_stop_bits(),
            read_timeout_ms: default_read_timeout(),
            read_size: default_read_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Print measurement sets to stdout
    #[serde(default = "default_console")]
    pub console: bool,
    /// Append measurement sets to this CSV file
    pub csv: Option<PathBuf>,
}

fn default_console() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            console: default_console(),
            csv: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 0, 1 or 2
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "meter/measurements".to_string()
}

fn default_client_id() -> String {
    "meter-sniffer".to_string()
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive() -> u64 {
    30
}

impl MqttConfig {
    /// Broker settings with defaults for everything but the host
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_mqtt_port(),
            topic: default_topic(),
            client_id: default_client_id(),
            username: None,
            password: None,
            qos: default_qos(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl AppConfig {
    /// Register map from `[[registers]]`, or the built-in meter table
    pub fn register_map(&self) -> Result<RegisterMap> {
        if self.registers.is_empty() {
            meter::map_with_stride(self.decoder.address_stride)
                .context("Failed to build built-in register map")
        } else {
            RegisterMap::new(self.registers.clone()).context("Invalid [[registers]] table")
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .decoder
        .validate()
        .with_context(|| format!("Invalid [decoder] section in {:?}", path))?;
    config
        .register_map()
        .with_context(|| format!("Invalid register layout in {:?}", path))?;
    if let Some(mqtt) = &config.mqtt {
        anyhow::ensure!(mqtt.qos <= 2, "MQTT qos must be 0, 1 or 2, got {}", mqtt.qos);
    }

    Ok(config)
}
