//! State machine definition
//!
//! The session advances it on every step and checks it before issuing any
//! bus request.

use super::events::Event;
use crate::error::FaultKind;

/// Session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Nothing done yet
    Uninit,
    /// Driver initialized
    Initialized,
    /// Peripheral powered
    PoweredUp,
    /// Bus speed mode set
    BusConfigured,
    /// Address assignment in progress
    AddressPending,
    /// Peer address resolved
    AddressAssigned,
    /// Transmit phase of an exchange
    Transmitting,
    /// Receive and verify phase of an exchange
    Receiving,
    /// Recoverable fault; cleanup pending
    Faulted(FaultKind),
    /// Power-down attempted
    PoweredDown,
    /// Driver released; session over
    Uninitialized,
    /// Permanent halt; no further bus activity
    Halted(FaultKind),
}

impl State {
    /// Check if the peripheral is (or may still be) at full power
    pub fn is_powered(&self) -> bool {
        match self {
            State::PoweredUp
            | State::BusConfigured
            | State::AddressPending
            | State::AddressAssigned
            | State::Transmitting
            | State::Receiving => true,
            State::Faulted(kind) => kind.power_achieved(),
            _ => false,
        }
    }

    /// Check if the session is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Uninitialized | State::Halted(_))
    }

    /// Check if bus requests (assignment or transfers) may be issued
    pub fn may_transfer(&self) -> bool {
        matches!(
            self,
            State::BusConfigured
                | State::AddressPending
                | State::Transmitting
                | State::Receiving
        )
    }

    /// Process an event and return the next state
    pub fn transition(self, event: Event) -> Self {
        match (self, event) {
            // Bring-up
            (State::Uninit, Event::Initialized) => State::Initialized,
            // Driver never came up: nothing to undo
            (State::Uninit, Event::Fault(_)) => State::Uninitialized,

            (State::Initialized, Event::PoweredUp) => State::PoweredUp,
            (State::Initialized, Event::Fault(kind)) => State::Faulted(kind),

            (State::PoweredUp, Event::BusConfigured) => State::BusConfigured,
            (State::PoweredUp, Event::Fault(kind)) => State::Faulted(kind),

            // Address assignment (two rounds)
            (State::BusConfigured, Event::AssignIssued) => State::AddressPending,
            (State::BusConfigured, Event::Fault(kind)) => State::Faulted(kind),

            (State::AddressPending, Event::AssignIssued) => State::AddressPending,
            (State::AddressPending, Event::AddressAssigned) => State::AddressAssigned,
            (State::AddressPending, Event::Fault(kind)) => State::Faulted(kind),
            (State::AddressPending, Event::Halt(kind)) => State::Halted(kind),

            // Steady state
            (State::AddressAssigned, Event::StartTransfers) => State::Transmitting,

            (State::Transmitting, Event::TransmitDone) => State::Receiving,
            (State::Transmitting, Event::Fault(kind)) => State::Faulted(kind),
            (State::Transmitting, Event::Halt(kind)) => State::Halted(kind),

            (State::Receiving, Event::Verified) => State::Transmitting,
            (State::Receiving, Event::Fault(kind)) => State::Faulted(kind),
            (State::Receiving, Event::Halt(kind)) => State::Halted(kind),

            // Unwind
            (state, Event::PoweredDown) if state.is_powered() => State::PoweredDown,
            (State::Faulted(_) | State::PoweredDown, Event::Uninitialized) => {
                State::Uninitialized
            }

            // Default: stay in current state
            _ => self,
        }
    }
}
