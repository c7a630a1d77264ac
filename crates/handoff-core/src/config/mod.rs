//! Configuration management for Handoff.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/handoff/config.toml` |
//! | macOS | `~/Library/Application Support/Handoff/config.toml` |
//! | Windows | `%APPDATA%\Handoff\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use handoff_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Default port: {}", config.listener.port);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transfer::TransferConfig;

/// Main configuration struct for Handoff.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sender settings
    pub listener: ListenerConfig,
    /// Receiver settings
    pub receiver: ReceiverConfig,
    /// Settings shared by both roles
    pub transfer: TransferSettings,
}

/// Sender configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port to listen on
    pub port: u16,
    /// Address to bind
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

/// Receiver configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Default directory for received files
    pub output_dir: Option<PathBuf>,
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Chunk size for streaming the body
    pub chunk_size: usize,
    /// How long to wait for a TCP dial
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Deadline for a single read or write (None waits forever)
    #[serde(with = "humantime_serde::option", skip_serializing_if = "Option::is_none")]
    pub io_timeout: Option<Duration>,
    /// Enable TCP keep-alive on transfer sockets
    pub tcp_keepalive: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        let defaults = TransferConfig::default();
        Self {
            chunk_size: defaults.chunk_size,
            connect_timeout: defaults.connect_timeout,
            io_timeout: defaults.io_timeout,
            tcp_keepalive: defaults.tcp_keepalive,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "handoff", "Handoff")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Build the runtime transfer configuration.
    #[must_use]
    pub fn to_transfer_config(&self) -> TransferConfig {
        TransferConfig {
            chunk_size: self.transfer.chunk_size.max(1),
            bind_address: self.listener.bind_address.clone(),
            connect_timeout: self.transfer.connect_timeout,
            io_timeout: self.transfer.io_timeout,
            tcp_keepalive: self.transfer.tcp_keepalive,
            ..TransferConfig::default()
        }
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    fn parse(s: &str) -> Result<Duration, String> {
        s.strip_suffix('s')
            .map(|secs| {
                secs.parse()
                    .map(Duration::from_secs)
                    .map_err(|e| e.to_string())
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map_err(|e| e.to_string())
                        .and_then(|m| {
                            m.checked_mul(60)
                                .ok_or_else(|| format!("duration '{s}' is too large"))
                        })
                        .map(Duration::from_secs)
                })
            })
            .unwrap_or_else(|| Err(format!("invalid duration format: '{s}'")))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        #[allow(clippy::ref_option)]
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.listener.port, crate::DEFAULT_PORT);
        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.transfer.connect_timeout, Duration::from_secs(10));
        assert!(config.transfer.io_timeout.is_none());
        assert!(config.receiver.output_dir.is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config").join("config.toml");

        let mut original = Config::default();
        original.listener.port = 51000;
        original.receiver.output_dir = Some(PathBuf::from("/tmp/out"));
        original.transfer.chunk_size = 64 * 1024;
        original.transfer.io_timeout = Some(Duration::from_secs(120));

        original.save_to(&config_path).expect("save");
        let loaded = Config::load_from(&config_path).expect("load");

        assert_eq!(loaded.listener.port, 51000);
        assert_eq!(loaded.receiver.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(loaded.transfer.chunk_size, 64 * 1024);
        assert_eq!(loaded.transfer.io_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_config_missing_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("nope.toml")).expect("load");
        assert_eq!(config.listener.port, crate::DEFAULT_PORT);
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[listener]
port = 52000

[transfer]
connect_timeout = "2m"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.listener.port, 52000);
        assert_eq!(config.listener.bind_address, "0.0.0.0");
        assert_eq!(config.transfer.connect_timeout, Duration::from_secs(120));
        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_config_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[listener]\nport = \"not a number\"\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_config_rejects_overflowing_duration() {
        let hostile = "[transfer]\nconnect_timeout = \"400000000000000000m\"\n";
        let err = toml::from_str::<Config>(hostile).expect_err("overflow rejected");
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_humantime_duration_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");

        assert!(toml_str.contains("connect_timeout = \"10s\""));
        assert!(!toml_str.contains("io_timeout"));
        assert!(toml_str.contains("[listener]"));
        assert!(toml_str.contains("[transfer]"));
    }

    #[test]
    fn test_to_transfer_config() {
        let mut config = Config::default();
        config.transfer.chunk_size = 0;
        config.listener.bind_address = "127.0.0.1".to_string();

        let runtime = config.to_transfer_config();
        assert_eq!(runtime.chunk_size, 1);
        assert_eq!(runtime.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_config_path() {
        assert!(Config::config_path().ends_with("config.toml"));
    }
}
