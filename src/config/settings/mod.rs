
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_FLOWER_IMAGE: &str = "assets/lily.jpeg";
pub const DEFAULT_FLOWER_MIME_TYPE: &str = "image/png";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Where and how the server listens. `host` and `port` only apply to the
/// HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportMode,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Stdio,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssetConfig {
    /// Image served by the flower tool, resolved against the working directory
    /// when relative
    pub flower_image: PathBuf,
    pub flower_mime_type: String,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            transport: TransportMode::Stdio,
        }
    }
}

impl Default for AssetConfig {
    #[inline]
    fn default() -> Self {
        Self {
            flower_image: PathBuf::from(DEFAULT_FLOWER_IMAGE),
            flower_mime_type: DEFAULT_FLOWER_MIME_TYPE.to_string(),
        }
    }
}

impl fmt::Display for TransportMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid host: {0} (cannot be empty)")]
    InvalidHost(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid image path: {0} (cannot be empty)")]
    InvalidImagePath(String),
    #[error("Invalid MIME type: {0} (expected 'image/<subtype>')")]
    InvalidMimeType(String),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `~/.mcp-starter`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".mcp-starter"))
            .or_else(|| dirs::config_dir().map(|config| config.join("mcp-starter")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.assets.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        self.endpoint_url()?;

        Ok(())
    }

    /// `host:port` in the form accepted by `TcpListener::bind`
    #[inline]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("http://{}:{}", self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = ServerConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }
}

impl AssetConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flower_image.as_os_str().is_empty() {
            return Err(ConfigError::InvalidImagePath(
                self.flower_image.display().to_string(),
            ));
        }

        match self.flower_mime_type.split_once('/') {
            Some(("image", subtype)) if !subtype.is_empty() => Ok(()),
            _ => Err(ConfigError::InvalidMimeType(self.flower_mime_type.clone())),
        }
    }
}
