//! Session fault taxonomy
//!
//! Two dispositions exist. Faults with nothing in flight (a failed bring-up
//! step or a request the driver refused) unwind through best-effort cleanup
//! and return control. Faults once an accepted request went wrong (an error
//! completion, an echo mismatch, an expired wait) halt the session
//! permanently: no further bus calls are made.

use crate::buffer::Mismatch;
use crate::config::ConfigError;

/// Bus operation a fault is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    Initialize,
    PowerUp,
    Configure,
    AssignAddress,
    Transmit,
    Receive,
    Verify,
    PowerDown,
    Uninitialize,
}

/// Fault classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Driver initialization failed
    Init,
    /// Power-up failed
    Power,
    /// Bus-mode configuration failed
    BusConfig,
    /// Dynamic address assignment failed
    AddressAssignment,
    /// Transmit failed
    Transmit,
    /// Receive failed
    Receive,
    /// Echoed data differs from transmitted data
    IntegrityMismatch,
    /// No completion arrived within the configured bound
    Timeout(Operation),
    /// Completion signal misuse (stale or missing outcome)
    Protocol,
}

impl FaultKind {
    /// Check if the peripheral reached full power before this fault
    pub fn power_achieved(&self) -> bool {
        !matches!(self, FaultKind::Init | FaultKind::Power)
    }
}

/// Why an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cause<E> {
    /// The driver refused the request
    Rejected(E),
    /// The request was accepted but completed with a bus error
    Completion,
    /// No completion within the configured bound
    TimedOut,
    /// Echoed data differs
    Mismatch(Mismatch),
    /// The completion signal held a stale outcome or none at all
    Signal,
    /// Request not allowed in the current session state, or `run` was called
    /// on a session that already ran
    InvalidState,
    /// Session configuration failed validation
    InvalidConfig(ConfigError),
}

/// A classified session fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fault<E> {
    pub kind: FaultKind,
    pub operation: Operation,
    pub cause: Cause<E>,
}

impl<E> Fault<E> {
    pub const fn new(kind: FaultKind, operation: Operation, cause: Cause<E>) -> Self {
        Self {
            kind,
            operation,
            cause,
        }
    }

    /// Driver error, if the driver rejected the request
    pub fn driver_error(&self) -> Option<&E> {
        match &self.cause {
            Cause::Rejected(e) => Some(e),
            _ => None,
        }
    }

    /// Echo mismatch details, if the fault is an integrity failure
    pub fn mismatch(&self) -> Option<Mismatch> {
        match self.cause {
            Cause::Mismatch(m) => Some(m),
            _ => None,
        }
    }
}

/// Result of a single best-effort cleanup call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CleanupStep<E> {
    /// Not attempted
    #[default]
    Skipped,
    /// Call succeeded
    Done,
    /// Call failed; reported, never escalated
    Failed(E),
}

impl<E> CleanupStep<E> {
    pub fn is_failed(&self) -> bool {
        matches!(self, CleanupStep::Failed(_))
    }
}

/// Outcome of the unwind path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CleanupReport<E> {
    pub power_down: CleanupStep<E>,
    pub uninitialize: CleanupStep<E>,
}

impl<E> CleanupReport<E> {
    /// Nothing was attempted
    pub const fn skipped() -> Self {
        Self {
            power_down: CleanupStep::Skipped,
            uninitialize: CleanupStep::Skipped,
        }
    }

    /// Check if no attempted cleanup call failed
    pub fn is_clean(&self) -> bool {
        !self.power_down.is_failed() && !self.uninitialize.is_failed()
    }
}

/// Terminal session error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError<E> {
    /// Session unwound through cleanup and returned control
    Aborted {
        fault: Fault<E>,
        cleanup: CleanupReport<E>,
    },
    /// Session halted permanently; no cleanup, no further bus calls
    Halted { fault: Fault<E> },
}

impl<E> SessionError<E> {
    pub fn fault(&self) -> &Fault<E> {
        match self {
            SessionError::Aborted { fault, .. } | SessionError::Halted { fault } => fault,
        }
    }

    pub fn kind(&self) -> FaultKind {
        self.fault().kind
    }

    /// Check if this is a permanent halt
    pub fn is_halt(&self) -> bool {
        matches!(self, SessionError::Halted { .. })
    }

    /// Cleanup outcome, `None` for a halt
    pub fn cleanup(&self) -> Option<&CleanupReport<E>> {
        match self {
            SessionError::Aborted { cleanup, .. } => Some(cleanup),
            SessionError::Halted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_achieved() {
        assert!(!FaultKind::Init.power_achieved());
        assert!(!FaultKind::Power.power_achieved());
        assert!(FaultKind::BusConfig.power_achieved());
        assert!(FaultKind::Timeout(Operation::Receive).power_achieved());
    }

    #[test]
    fn test_cleanup_report() {
        let report: CleanupReport<u8> = CleanupReport::skipped();
        assert!(report.is_clean());

        let report = CleanupReport {
            power_down: CleanupStep::Failed(3u8),
            uninitialize: CleanupStep::Done,
        };
        assert!(!report.is_clean());
    }

    #[test]
    fn test_session_error_accessors() {
        let mismatch = Mismatch {
            index: 1,
            expected: 2,
            actual: 0,
        };
        let halt: SessionError<()> = SessionError::Halted {
            fault: Fault::new(
                FaultKind::IntegrityMismatch,
                Operation::Verify,
                Cause::Mismatch(mismatch),
            ),
        };
        assert!(halt.is_halt());
        assert!(halt.cleanup().is_none());
        assert_eq!(halt.fault().mismatch(), Some(mismatch));
        assert_eq!(halt.fault().driver_error(), None);

        let abort = SessionError::Aborted {
            fault: Fault::new(FaultKind::Power, Operation::PowerUp, Cause::Rejected(7u8)),
            cleanup: CleanupReport::skipped(),
        };
        assert!(!abort.is_halt());
        assert_eq!(abort.kind(), FaultKind::Power);
        assert_eq!(abort.fault().driver_error(), Some(&7));
    }
}
