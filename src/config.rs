//! Configuration for the droid-depot CLI
//!
//! Sources, highest precedence first:
//! 1. CLI arguments
//! 2. Configuration file (TOML)
//! 3. Default values

use crate::beacon::ReactionConfig;
use crate::connection::ConnectionConfig;
use crate::transport::DroidDiscoveryConfig;
use anyhow::{anyhow, bail, Context, Result};
use bluer::Address;
use droiddepot_shared::payload::MAX_VOLUME;
use droiddepot_shared::timing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name searched for in the working directory
pub const LOCAL_CONFIG_FILE: &str = "droid-depot.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoverySettings,
    pub connection: ConnectionSettings,
    pub audio: AudioSettings,
    pub reactions: ReactionSettings,
    pub logging: LoggingSettings,
    /// File the settings were read from, `None` when running on defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Droid discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Length of one scan in milliseconds
    pub scan_duration_ms: u64,
    /// Keep scanning until a droid shows up
    pub retry: bool,
    /// Only connect to this droid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            scan_duration_ms: 5_000,
            retry: true,
            address: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Skip the pairing and shutdown animations
    pub silent: bool,
    pub connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub response_timeout_ms: u64,
    pub pairing_delay_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            silent: false,
            connect_timeout_ms: timing::CONNECT_SETTLE_TIMEOUT_MS,
            heartbeat_interval_ms: timing::HEARTBEAT_INTERVAL_MS,
            response_timeout_ms: timing::COMMAND_RESPONSE_TIMEOUT_MS,
            pairing_delay_ms: timing::PAIRING_ANIMATION_MS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Volume applied right after connecting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionSettings {
    pub scan_window_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for ReactionSettings {
    fn default() -> Self {
        Self {
            scan_window_ms: 5_000,
            cooldown_ms: timing::REACTION_COOLDOWN_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path or the standard locations
    ///
    /// Runs before logging is set up, so the chosen file is recorded in
    /// [`AppConfig::source`] rather than logged here.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match Self::find_config_file(config_path)? {
            Some(path) => {
                let mut config = Self::from_file(&path)?;
                config.source = Some(path);
                config
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn find_config_file(explicit_path: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            bail!("Configuration file not found: {}", path.display());
        }

        let search_paths = [
            Some(PathBuf::from(LOCAL_CONFIG_FILE)),
            dirs::config_dir().map(|p| p.join("droid-depot").join("config.toml")),
        ];

        for path in search_paths.into_iter().flatten() {
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(volume) = self.audio.volume {
            if volume > MAX_VOLUME {
                bail!("audio.volume must be between 0 and {}", MAX_VOLUME);
            }
        }

        let intervals = [
            ("connection.heartbeat_interval_ms", self.connection.heartbeat_interval_ms),
            ("reactions.scan_window_ms", self.reactions.scan_window_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                bail!("{} must be greater than 0", name);
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            );
        }

        self.droid_address()?;
        Ok(())
    }

    /// Configured droid address, if any
    pub fn droid_address(&self) -> Result<Option<Address>> {
        self.discovery
            .address
            .as_deref()
            .map(|a| {
                a.parse::<Address>()
                    .map_err(|e| anyhow!("Invalid droid address '{}': {}", a, e))
            })
            .transpose()
    }

    pub fn discovery_config(&self) -> Result<DroidDiscoveryConfig> {
        Ok(DroidDiscoveryConfig {
            scan_duration: Duration::from_millis(self.discovery.scan_duration_ms),
            retry: self.discovery.retry,
            address: self.droid_address()?,
        })
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            silent: self.connection.silent,
            heartbeat_interval: Duration::from_millis(self.connection.heartbeat_interval_ms),
            response_timeout: Duration::from_millis(self.connection.response_timeout_ms),
            pairing_delay: Duration::from_millis(self.connection.pairing_delay_ms),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.connect_timeout_ms)
    }

    pub fn reaction_config(&self) -> ReactionConfig {
        ReactionConfig {
            scan_window: Duration::from_millis(self.reactions.scan_window_ms),
            cooldown: Duration::from_millis(self.reactions.cooldown_ms),
        }
    }

    /// Render the effective configuration
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.discovery.retry);
        assert_eq!(config.connection.heartbeat_interval_ms, 10_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.source.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[discovery]
retry = false
address = "E4:DF:6A:12:34:56"

[connection]
silent = true

[audio]
volume = 20
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.source.as_deref(), Some(file.path()));
        assert!(!config.discovery.retry);
        assert!(config.connection.silent);
        assert_eq!(config.audio.volume, Some(20));
        // Unset values keep their defaults
        assert_eq!(config.connection.pairing_delay_ms, 4_000);

        let discovery = config.discovery_config().unwrap();
        assert_eq!(
            discovery.address,
            Some(Address::new([0xe4, 0xdf, 0x6a, 0x12, 0x34, 0x56]))
        );
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.audio.volume = Some(101);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.discovery.address = Some("not-an-address".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = AppConfig::default();
        config.connection.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.reactions.scan_window_ms = 0;
        assert!(config.validate().is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nheartbeat_interval_ms = 0").unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.reactions.cooldown_ms, config.reactions.cooldown_ms);
        assert_eq!(parsed.discovery.scan_duration_ms, config.discovery.scan_duration_ms);
        assert!(!text.contains("source"));
    }

    #[test]
    fn test_connection_config_conversion() {
        let mut config = AppConfig::default();
        config.connection.silent = true;
        config.connection.response_timeout_ms = 250;

        let connection = config.connection_config();
        assert!(connection.silent);
        assert_eq!(connection.response_timeout, Duration::from_millis(250));
    }
}
