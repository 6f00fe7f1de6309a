//! I3C bus abstractions
//!
//! Provides the controller-side (master) operations of an I3C peripheral.
//! Bus operations are *issued* by the caller and *completed* asynchronously:
//! the driver reports the end of every accepted transfer through the
//! [`EventSink`] registered at [`I3cController::initialize`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Peripheral power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Peripheral clocks gated, registers not accessible
    Off,
    /// Retention mode
    Low,
    /// Fully powered and clocked
    Full,
}

/// Bus speed mode
///
/// Selects which legacy I2C devices (if any) share the bus with I3C targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BusMode {
    /// Only I3C devices on the bus
    #[default]
    Pure,
    /// Mixed bus, legacy devices in Fast-mode Plus (1 Mbps)
    MixedFastPlus,
    /// Mixed bus, legacy devices in Fast-mode (400 kbps)
    MixedFast,
    /// Mixed bus, legacy devices in Standard-mode (100 kbps)
    MixedSlow,
}

impl BusMode {
    /// Legacy I2C clock in Hz, or `None` on a pure I3C bus
    pub const fn legacy_clock_hz(&self) -> Option<u32> {
        match self {
            BusMode::Pure => None,
            BusMode::MixedFastPlus => Some(1_000_000),
            BusMode::MixedFast => Some(400_000),
            BusMode::MixedSlow => Some(100_000),
        }
    }
}

/// Synchronous controller configuration request
///
/// Control calls take effect immediately; no completion notification follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Control {
    /// Select the bus speed mode
    SetBusMode(BusMode),
}

/// Completion notification delivered to the registered [`EventSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferEvent {
    /// The issued operation finished successfully
    Done,
    /// The issued operation failed on the bus (NACK, parity, ...)
    Error,
}

/// Driver and API version numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverVersion {
    /// Abstraction API version
    pub api: u16,
    /// Driver implementation version
    pub driver: u16,
}

/// Receiver of transfer completion notifications
///
/// Called from the driver's interrupt context. Implementations must be
/// short and must never block.
pub trait EventSink: Sync {
    /// Report the completion of the operation currently in flight
    fn notify(&self, event: TransferEvent);
}

/// I3C bus controller
///
/// `'a` is the lifetime of the event sink registered at initialization.
///
/// Issuing calls (`assign_dynamic_address`, `transmit`, `receive`) return
/// `Err` when the driver rejects the request; in that case nothing is in
/// flight and no notification will follow. An accepted request produces
/// exactly one [`TransferEvent`].
pub trait I3cController<'a> {
    /// Error type for rejected requests
    type Error: core::fmt::Debug;

    /// Get the driver version
    fn version(&self) -> DriverVersion {
        DriverVersion::default()
    }

    /// Initialize the driver and register the completion sink
    fn initialize(&mut self, sink: &'a dyn EventSink) -> Result<(), Self::Error>;

    /// Change the peripheral power state
    fn power_control(&mut self, state: PowerState) -> Result<(), Self::Error>;

    /// Apply a configuration request
    fn control(&mut self, control: Control) -> Result<(), Self::Error>;

    /// Run dynamic address assignment for the target with `static_address`
    ///
    /// Returns the dynamic address the controller resolved for the target.
    /// Whether the target acknowledged is reported through the sink.
    fn assign_dynamic_address(&mut self, static_address: u8) -> Result<u8, Self::Error>;

    /// Write `data` to the target at dynamic `address`
    fn transmit(&mut self, address: u8, data: &[u8]) -> Result<(), Self::Error>;

    /// Read `buffer.len()` bytes from the target at dynamic `address`
    ///
    /// The buffer is filled before the completion is signalled.
    fn receive(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Release the driver
    fn uninitialize(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_mode_clock() {
        assert_eq!(BusMode::Pure.legacy_clock_hz(), None);
        assert_eq!(BusMode::MixedFastPlus.legacy_clock_hz(), Some(1_000_000));
        assert_eq!(BusMode::MixedFast.legacy_clock_hz(), Some(400_000));
        assert_eq!(BusMode::MixedSlow.legacy_clock_hz(), Some(100_000));
    }

    #[test]
    fn test_bus_mode_default_pure() {
        assert_eq!(BusMode::default(), BusMode::Pure);
    }
}
