//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;
use voxrelay_gateway::{GatewayConfig, ReplyWaitConfig};
use voxrelay_types::MessageRules;
use voxrelay_voice::{AudioConfig, SttConfig, TtsConfig};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Agent gateway connection and session settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub reply_wait: ReplyWaitConfig,

    /// Sentinel and echo classification rules.
    #[serde(default)]
    pub rules: MessageRules,

    #[serde(default)]
    pub stt: SttConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment root served for any path no route claims.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Scratch space for uploads in flight.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voxrelay_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/voxrelay")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOXRELAY_HOST`, `VOXRELAY_PORT` override `server.host` / `server.port`
/// - `VOXRELAY_STATIC_DIR` overrides `server.static_dir`
/// - `VOXRELAY_GATEWAY_URL` overrides `gateway.url`
/// - `VOXRELAY_ECHO_TARGET` overrides `gateway.echo_target`
/// - `VOXRELAY_STT_API_KEY` overrides `stt.api_key`
/// - `VOXRELAY_WHISPER_MODEL` overrides `stt.model_path`
/// - `VOXRELAY_DEFAULT_VOICE` overrides `tts.default_voice`
/// - `VOXRELAY_TEMP_DIR` overrides `storage.temp_dir`
/// - `VOXRELAY_LOG_LEVEL` overrides `logging.level`
/// - `VOXRELAY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the result fails [`validate`].
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    let config = apply_env_overrides(config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Rejects settings the router cannot be built from.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let prefix = config.tts.url_prefix.trim_end_matches('/');
    if !prefix.starts_with('/') {
        return Err(ConfigError::Invalid(format!(
            "tts.url_prefix must be an absolute path below the root, got {:?}",
            config.tts.url_prefix
        )));
    }
    Ok(())
}

/// Applies `VOXRELAY_*` overrides read through `lookup`.
fn apply_env_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(host) = lookup("VOXRELAY_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("VOXRELAY_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(dir) = lookup("VOXRELAY_STATIC_DIR") {
        config.server.static_dir = PathBuf::from(dir);
    }
    if let Some(url) = lookup("VOXRELAY_GATEWAY_URL") {
        config.gateway.url = url;
    }
    if let Some(target) = lookup("VOXRELAY_ECHO_TARGET") {
        config.gateway.echo_target = target;
    }
    if let Some(key) = lookup("VOXRELAY_STT_API_KEY") {
        config.stt.api_key = key;
    }
    if let Some(model) = lookup("VOXRELAY_WHISPER_MODEL") {
        config.stt.model_path = PathBuf::from(model);
    }
    if let Some(voice) = lookup("VOXRELAY_DEFAULT_VOICE") {
        config.tts.default_voice = voice;
    }
    if let Some(dir) = lookup("VOXRELAY_TEMP_DIR") {
        config.storage.temp_dir = PathBuf::from(dir);
    }
    if let Some(level) = lookup("VOXRELAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOXRELAY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    config
}
