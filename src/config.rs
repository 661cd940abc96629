//! Configuration loading for Switchboard.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the Switchboard home directory (~/.switchboard).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".switchboard"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.switchboard/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;

    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = serde_json::from_str(&content)?;

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Write settings to ~/.switchboard/settings.json, creating the directory.
pub fn save_settings(settings: &Settings) -> Result<PathBuf> {
    let path = get_settings_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(settings)?)?;
    tracing::info!("Wrote settings to {}", path.display());
    Ok(path)
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.auth.jwt_secret.trim().is_empty() {
        return Err(Error::Config("auth.jwt_secret must not be empty".to_string()));
    }
    if settings.auth.token_ttl_hours == 0 {
        return Err(Error::Config(
            "auth.token_ttl_hours must be greater than zero".to_string(),
        ));
    }
    if settings.channel.default_department.trim().is_empty() {
        return Err(Error::Config(
            "channel.default_department must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// HTTP listener configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Server {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Database {
    /// SQLite file; defaults to ~/.switchboard/switchboard.db
    pub path: Option<PathBuf>,
}

impl Database {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?.join("switchboard.db")),
        }
    }
}

/// Token issuing configuration.
#[derive(Serialize, Deserialize, Clone)]
pub struct Auth {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

fn default_jwt_secret() -> String {
    "switchboard-secret-key-change-in-production".to_string()
}

fn default_token_ttl_hours() -> u64 {
    24
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("jwt_secret", &"[redacted]")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .finish()
    }
}

/// Messaging channel configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Channel {
    /// Endpoint of the messaging gateway that delivers outbound text.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Department that receives conversations started by customers.
    #[serde(default = "default_department")]
    pub default_department: String,
    #[serde(default = "default_relay_timeout_secs")]
    pub relay_timeout_secs: u64,
}

fn default_gateway_url() -> String {
    "http://localhost:3001/send-message".to_string()
}

fn default_department() -> String {
    "Suporte".to_string()
}

fn default_relay_timeout_secs() -> u64 {
    10
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            default_department: default_department(),
            relay_timeout_secs: default_relay_timeout_secs(),
        }
    }
}

/// Switchboard settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,

    #[serde(default)]
    pub database: Database,

    #[serde(default)]
    pub auth: Auth,

    #[serde(default)]
    pub channel: Channel,
}
