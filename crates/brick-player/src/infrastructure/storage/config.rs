//! TOML-based configuration and profile loading for the player.
//!
//! The player configuration lives in the platform-appropriate config file:
//! - Windows:  `%APPDATA%\BrickPlayer\config.toml`
//! - Linux:    `~/.config/brickplayer/config.toml`
//! - macOS:    `~/Library/Application Support/BrickPlayer/config.toml`
//!
//! A path given on the command line overrides the platform location.
//!
//! ```toml
//! [player]
//! log_level = "debug"
//! bluetooth_enabled = true
//!
//! [listener]
//! port = 8080
//!
//! [[devices]]
//! id = "90:84:2B:00:00:01"
//! name = "BuWizz"
//! channels = 4
//! output_level_group = "buwizz"
//! ```
//!
//! Every field has a serde default, so an empty file (or no file at all on
//! first run) yields a working configuration.
//!
//! Controller profiles are separate TOML files loaded with [`load_profile`];
//! they are validated before they are handed to a session.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use brick_core::{ControllerProfile, DeviceKind, ProfileError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration and profile file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid listener bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("invalid profile: {0}")]
    Profile(#[from] ProfileError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level player configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default)]
    pub player: PlayerSection,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// General player behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSection {
    /// `tracing` filter directive: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Keep the session alive when the player is sent to the background.
    #[serde(default)]
    pub keep_running_in_background: bool,
    /// Whether the host Bluetooth radio is available.
    #[serde(default = "default_true")]
    pub bluetooth_enabled: bool,
}

/// Remote event listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ListenerConfig {
    /// Combines address and port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] when `bind_address` is not
    /// an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// A device known to the player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    /// Identifier referenced by profile actions.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: DeviceKind,
    #[serde(default = "default_channels")]
    pub channels: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_level_group: Option<String>,
    /// Simulated connection latency.
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_channels() -> u8 {
    4
}
fn default_connect_delay_ms() -> u64 {
    250
}

impl Default for PlayerSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            keep_running_in_background: false,
            bluetooth_enabled: default_true(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory cannot
/// be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform location, falling back to defaults
/// when the file does not exist yet.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<PlayerConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, falling back to defaults when the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<PlayerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PlayerConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &PlayerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads and validates a controller profile.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read (a missing profile
/// is an error), [`ConfigError::Parse`] for malformed TOML, and
/// [`ConfigError::Profile`] when validation fails.
pub fn load_profile(path: &Path) -> Result<ControllerProfile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let profile: ControllerProfile = toml::from_str(&content)?;
    profile.validate()?;
    Ok(profile)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("BrickPlayer"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("brickplayer"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("BrickPlayer")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
