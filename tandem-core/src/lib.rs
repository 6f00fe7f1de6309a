//! Tandem Core - I3C loopback session logic
//!
//! This crate contains the board-agnostic logic for exercising an I3C
//! controller against a single echoing target:
//! - Completion signal shared with the controller's interrupt context
//! - Session state machine
//! - Transfer buffers and echo verification
//! - Fault classification (cleanup unwind vs. permanent halt)
//!
//! The session is generic over [`tandem_hal::I3cController`] and an
//! [`embedded_hal_async::delay::DelayNs`] time source, so the same code runs
//! on a board or against the host simulator.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

// Must come first so the logging macros are visible to the other modules
mod fmt;

pub mod buffer;
pub mod config;
pub mod error;
pub mod session;
pub mod signal;
pub mod state;

pub use buffer::{Mismatch, TransferBuffer};
pub use config::SessionConfig;
pub use error::{Cause, CleanupReport, CleanupStep, Fault, FaultKind, Operation, SessionError};
pub use session::{Counters, Session, SessionReport};
pub use signal::{CompletionSignal, Outcome, SignalError};
pub use state::{Event, State};
