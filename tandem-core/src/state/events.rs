//! Events that trigger state transitions

use crate::error::FaultKind;

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Bring-up events
    /// Driver initialized, completion sink registered
    Initialized,
    /// Peripheral at full power
    PoweredUp,
    /// Bus speed mode applied and settled
    BusConfigured,

    // Address assignment events
    /// An assignment round was issued
    AssignIssued,
    /// Authoritative round succeeded, peer address resolved
    AddressAssigned,

    // Steady-state events
    /// Entering the transmit/receive loop
    StartTransfers,
    /// Transmit completed successfully
    TransmitDone,
    /// Receive completed and the echo matched
    Verified,

    // Fault events
    /// Recoverable fault, unwind through cleanup
    Fault(FaultKind),
    /// Unrecoverable fault, stop permanently
    Halt(FaultKind),

    // Unwind events
    /// Power-down attempted
    PoweredDown,
    /// Uninitialize attempted
    Uninitialized,
}
