//! Simulator configuration
//!
//! Loaded from a TOML file with two tables, `[session]` for the loopback
//! session and `[sim]` for the simulated bus. Missing keys take defaults.

use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tandem_core::config::{ConfigError as SessionConfigError, BROADCAST_ADDRESS};
use tandem_core::SessionConfig;
use tracing::{debug, info};

use crate::target::DEFAULT_DYNAMIC_ADDRESS;

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "tandem.toml";

/// Simulated bus settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Address the target takes when assigned
    pub dynamic_address: u8,
    /// Ignore the first address assignment after reset
    pub nack_first_assign: bool,
    /// Interrupt latency; completions are delivered inline when unset
    pub latency_us: Option<u32>,
    /// Corrupt the echo on this read (1-based)
    pub corrupt_at: Option<u32>,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            dynamic_address: DEFAULT_DYNAMIC_ADDRESS,
            nack_first_assign: true,
            latency_us: None,
            corrupt_at: None,
        }
    }
}

/// Complete simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub session: SessionConfig,
    pub sim: SimSettings,
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// File could not be read
    Io(io::Error),
    /// TOML parsing failed
    Toml(toml::de::Error),
    /// Session values out of range
    Invalid(SessionConfigError),
    /// Target dynamic address outside 7-bit range or reserved
    InvalidDynamicAddress(u8),
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Toml(e)
    }
}

impl From<SessionConfigError> for ConfigError {
    fn from(e: SessionConfigError) -> Self {
        ConfigError::Invalid(e)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {e}"),
            ConfigError::Toml(e) => write!(f, "invalid config: {e}"),
            ConfigError::Invalid(e) => write!(f, "config value out of range: {e:?}"),
            ConfigError::InvalidDynamicAddress(a) => write!(f, "invalid dynamic address {a:#x}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate a TOML configuration
pub fn parse(text: &str) -> Result<SimConfig, ConfigError> {
    let config: SimConfig = toml::from_str(text)?;
    config.session.validate()?;
    let address = config.sim.dynamic_address;
    if address > 0x7F || address == BROADCAST_ADDRESS {
        return Err(ConfigError::InvalidDynamicAddress(address));
    }
    Ok(config)
}

/// Load configuration from `path`
pub fn load(path: &Path) -> Result<SimConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config = parse(&text)?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Load configuration from `path`, falling back to defaults if it is absent
pub fn load_or_default(path: &Path) -> Result<SimConfig, ConfigError> {
    match load(path) {
        Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(SimConfig::default())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_hal::BusMode;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(parse("").unwrap(), SimConfig::default());
    }

    #[test]
    fn test_partial_tables() {
        let config = parse(
            r#"
            [session]
            bus_mode = "mixed_fast"
            completion_timeout_us = 5000
            max_iterations = 10

            [sim]
            latency_us = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.session.bus_mode, BusMode::MixedFast);
        assert_eq!(config.session.completion_timeout_us, Some(5000));
        assert_eq!(config.session.max_iterations, Some(10));
        assert_eq!(config.session.static_address, 0x48);
        assert_eq!(config.sim.latency_us, Some(50));
        assert!(config.sim.nack_first_assign);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = parse("[session]\nstatic_address = 126\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = parse("[sim]\ndynamic_address = 0x7E\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDynamicAddress(0x7E)));

        let err = parse("[session]\nbus_mode = \"turbo\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = load_or_default(Path::new("/nonexistent/tandem.toml")).unwrap();
        assert_eq!(config, SimConfig::default());
    }
}
