//! Session configuration
//!
//! Timing values are in microseconds. All fields have defaults matching the
//! reference target board, so a partial TOML table is enough.

use tandem_hal::BusMode;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Static (provisioning) address of the loopback target
pub const DEFAULT_STATIC_ADDRESS: u8 = 0x48;

/// I3C broadcast address, never valid for a single target
pub const BROADCAST_ADDRESS: u8 = 0x7E;

/// Settling time after bus-mode configuration and around address assignment
pub const DEFAULT_SETTLE_US: u32 = 1000;

/// Pause before each transmit
pub const DEFAULT_ITERATION_DELAY_US: u32 = 100;

/// Pause between transmit completion and receive
pub const DEFAULT_TURNAROUND_US: u32 = 1000;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Static address outside 7-bit range or reserved
    InvalidStaticAddress(u8),
    /// Completion timeout of zero would fail every wait
    ZeroTimeout,
    /// Iteration bound of zero would never transfer
    ZeroIterations,
}

/// Loopback session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Target's static address used for dynamic address assignment
    pub static_address: u8,
    /// Bus speed mode
    pub bus_mode: BusMode,
    /// Delay after bus-mode configuration
    pub bus_settle_us: u32,
    /// Delay between the two assignment rounds and after the second
    pub assign_settle_us: u32,
    /// Delay before each transmit
    pub iteration_delay_us: u32,
    /// Delay between transmit and receive
    pub turnaround_delay_us: u32,
    /// Upper bound on each completion wait (`None` waits forever)
    pub completion_timeout_us: Option<u32>,
    /// Stop cleanly after this many verified exchanges (`None` runs forever)
    pub max_iterations: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            static_address: DEFAULT_STATIC_ADDRESS,
            bus_mode: BusMode::Pure,
            bus_settle_us: DEFAULT_SETTLE_US,
            assign_settle_us: DEFAULT_SETTLE_US,
            iteration_delay_us: DEFAULT_ITERATION_DELAY_US,
            turnaround_delay_us: DEFAULT_TURNAROUND_US,
            completion_timeout_us: None,
            max_iterations: None,
        }
    }
}

impl SessionConfig {
    /// Configuration with every delay set to zero (simulation and tests)
    pub fn no_delays() -> Self {
        Self {
            bus_settle_us: 0,
            assign_settle_us: 0,
            iteration_delay_us: 0,
            turnaround_delay_us: 0,
            ..Self::default()
        }
    }

    /// Validate field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.static_address > 0x7F || self.static_address == BROADCAST_ADDRESS {
            return Err(ConfigError::InvalidStaticAddress(self.static_address));
        }
        if self.completion_timeout_us == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_iterations == Some(0) {
            return Err(ConfigError::ZeroIterations);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.static_address, 0x48);
        assert_eq!(config.bus_mode, BusMode::Pure);
        assert_eq!(config.completion_timeout_us, None);
        assert_eq!(config.max_iterations, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_delays_keeps_addressing() {
        let config = SessionConfig::no_delays();
        assert_eq!(config.bus_settle_us, 0);
        assert_eq!(config.turnaround_delay_us, 0);
        assert_eq!(config.static_address, DEFAULT_STATIC_ADDRESS);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SessionConfig::default();
        config.static_address = 0x80;
        assert_eq!(config.validate(), Err(ConfigError::InvalidStaticAddress(0x80)));

        config.static_address = BROADCAST_ADDRESS;
        assert!(config.validate().is_err());

        let config = SessionConfig {
            completion_timeout_us: Some(0),
            ..SessionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));

        let config = SessionConfig {
            max_iterations: Some(0),
            ..SessionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroIterations));
    }
}
