/*!
 * Configuration management for the Meross connector.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings: the bridge account supplied by the host platform, HTTP and MQTT
 * tuning, logging, and the data directory used for persisted cloud state.
 */
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Sub-directory of the data directory holding persisted cloud state
pub const STORAGE_DIR: &str = "meross";
/// File name of the persisted credentials
pub const CREDENTIAL_FILE_NAME: &str = "meross_credentials.json";
/// File name of the persisted device list
pub const DEVICE_FILE_NAME: &str = "meross_devices.json";

/// Connector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bridge account configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// HTTP session configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// MQTT session configuration
    #[serde(default)]
    pub mqtt: MqttConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// User data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Account settings of the bridge, as handed over by the host platform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the Meross cloud API, e.g. `https://iotx-eu.meross.com`
    #[serde(default)]
    pub host_name: String,

    /// Account e-mail
    #[serde(default)]
    pub user_email: String,

    /// Account password
    #[serde(default)]
    pub user_password: String,
}

/// HTTP session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection timeout in seconds
    #[serde(default = "default_http_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// `AppType` header value
    #[serde(default = "default_app_type")]
    pub app_type: String,

    /// `AppVersion` header value
    #[serde(default = "default_version")]
    pub app_version: String,

    /// Version appended to the user agent
    #[serde(default = "default_version")]
    pub module_version: String,

    /// `AppLanguage` header value
    #[serde(default = "default_app_language")]
    pub app_language: String,

    /// Vendor header value
    #[serde(default = "default_vendor")]
    pub vendor: String,
}

/// MQTT session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host; when unset the MQTT domain from the cloud credentials is used
    #[serde(default)]
    pub broker_host: Option<String>,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Whether to connect over TLS
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// How long to wait for a reply after publishing, in seconds
    #[serde(default = "default_reception_timeout")]
    pub reception_timeout_secs: u64,

    /// How long to wait for the broker to acknowledge the connection, in seconds
    #[serde(default = "default_mqtt_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_http_connect_timeout(),
            app_type: default_app_type(),
            app_version: default_version(),
            module_version: default_version(),
            app_language: default_app_language(),
            vendor: default_vendor(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: None,
            port: default_mqtt_port(),
            use_tls: true,
            keep_alive_secs: default_keep_alive(),
            reception_timeout_secs: default_reception_timeout(),
            connect_timeout_secs: default_mqtt_connect_timeout(),
        }
    }
}

fn default_app_name() -> String {
    "meross".to_string()
}

fn default_data_dir() -> String {
    "./userdata".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_connect_timeout() -> u64 {
    15
}

fn default_app_type() -> String {
    "MerossIOT".to_string()
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_app_language() -> String {
    "EN".to_string()
}

fn default_vendor() -> String {
    "meross".to_string()
}

fn default_mqtt_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

fn default_keep_alive() -> u64 {
    5
}

fn default_reception_timeout() -> u64 {
    5
}

fn default_mqtt_connect_timeout() -> u64 {
    15
}

impl Config {
    /// Directory holding the persisted credentials and device list
    pub fn storage_dir(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join(STORAGE_DIR)
    }

    /// Path of the persisted credentials file
    pub fn credential_file(&self) -> PathBuf {
        self.storage_dir().join(CREDENTIAL_FILE_NAME)
    }

    /// Path of the persisted device list file
    pub fn device_file(&self) -> PathBuf {
        self.storage_dir().join(DEVICE_FILE_NAME)
    }
}

impl BridgeConfig {
    /// Fail when any of the account fields is blank
    pub fn validate(&self) -> Result<()> {
        let blank = [
            ("host_name", &self.host_name),
            ("user_email", &self.user_email),
            ("user_password", &self.user_password),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect::<Vec<_>>();

        if blank.is_empty() {
            Ok(())
        } else {
            Err(Error::config(format!("Missing bridge settings: {}", blank.join(", "))))
        }
    }
}

impl HttpConfig {
    /// Connection timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl MqttConfig {
    /// Keep-alive interval as a duration
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Reply window as a duration
    pub fn reception_timeout(&self) -> Duration {
        Duration::from_secs(self.reception_timeout_secs)
    }

    /// Connection acknowledgement timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}
