//! Completion signal
//!
//! Single-slot rendezvous between the controller's interrupt context (writer)
//! and the session (reader). At most one operation is armed at a time: the
//! reader arms the slot before issuing, the writer completes it exactly once,
//! and the reader consumes the outcome before arming again.
//!
//! The slot is one atomic byte, so the writer never blocks and never tears.
//! Waiting is a future woken by the writer instead of a spin on the flag.

use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;
use portable_atomic::{AtomicU32, AtomicU8, Ordering};
use tandem_hal::{EventSink, TransferEvent};

const SLOT_IDLE: u8 = 0;
const SLOT_PENDING: u8 = 1;
const SLOT_SUCCESS: u8 = 2;
const SLOT_ERROR: u8 = 3;

/// Outcome of the operation in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Issued, completion not yet reported
    Pending,
    /// Completed successfully
    Success,
    /// Completed with a bus error
    Error,
}

impl Outcome {
    fn from_slot(slot: u8) -> Option<Self> {
        match slot {
            SLOT_PENDING => Some(Outcome::Pending),
            SLOT_SUCCESS => Some(Outcome::Success),
            SLOT_ERROR => Some(Outcome::Error),
            _ => None,
        }
    }
}

impl From<TransferEvent> for Outcome {
    fn from(event: TransferEvent) -> Self {
        match event {
            TransferEvent::Done => Outcome::Success,
            TransferEvent::Error => Outcome::Error,
        }
    }
}

/// Misuse of the signal by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalError {
    /// An operation is still pending or its outcome was not consumed
    Busy,
    /// Nothing is armed, so no completion can arrive
    NotArmed,
}

/// Completion signal for the single operation in flight
pub struct CompletionSignal {
    slot: AtomicU8,
    waker: AtomicWaker,
    spurious: AtomicU32,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    /// Create an idle signal
    pub const fn new() -> Self {
        Self {
            slot: AtomicU8::new(SLOT_IDLE),
            waker: AtomicWaker::new(),
            spurious: AtomicU32::new(0),
        }
    }

    /// Reset the slot to `Pending` ahead of issuing an operation
    ///
    /// Fails with [`SignalError::Busy`] while a previous operation is still
    /// pending or its outcome has not been taken.
    pub fn arm(&self) -> Result<(), SignalError> {
        self.slot
            .compare_exchange(SLOT_IDLE, SLOT_PENDING, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| SignalError::Busy)
    }

    /// Abandon the armed operation
    ///
    /// Used when the driver rejected the request or the wait timed out.
    /// A completion arriving afterwards is counted as spurious.
    pub fn disarm(&self) {
        self.slot.store(SLOT_IDLE, Ordering::Release);
    }

    /// Report the outcome of the armed operation (writer side)
    ///
    /// Returns `false` if nothing was pending; the report is dropped.
    pub fn complete(&self, outcome: Outcome) -> bool {
        let value = match outcome {
            Outcome::Success => SLOT_SUCCESS,
            Outcome::Error => SLOT_ERROR,
            Outcome::Pending => return false,
        };

        match self
            .slot
            .compare_exchange(SLOT_PENDING, value, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.waker.wake();
                true
            }
            Err(_) => {
                self.spurious.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Current outcome without consuming it, `None` when idle
    pub fn peek(&self) -> Option<Outcome> {
        Outcome::from_slot(self.slot.load(Ordering::Acquire))
    }

    /// Check if an operation is armed or its outcome unconsumed
    pub fn is_armed(&self) -> bool {
        self.peek().is_some()
    }

    /// Consume a finished outcome, leaving the slot idle
    ///
    /// Returns `None` while the operation is still pending or nothing is armed.
    pub fn try_take(&self) -> Option<Outcome> {
        for value in [SLOT_SUCCESS, SLOT_ERROR] {
            if self
                .slot
                .compare_exchange(value, SLOT_IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Outcome::from_slot(value);
            }
        }
        None
    }

    /// Wait for the armed operation to finish and consume its outcome
    ///
    /// Never resolves to [`Outcome::Pending`].
    pub async fn wait(&self) -> Result<Outcome, SignalError> {
        poll_fn(|cx| {
            if let Some(outcome) = self.try_take() {
                return Poll::Ready(Ok(outcome));
            }
            if !self.is_armed() {
                return Poll::Ready(Err(SignalError::NotArmed));
            }

            self.waker.register(cx.waker());

            // Completion may have landed between the check and registration
            match self.try_take() {
                Some(outcome) => Poll::Ready(Ok(outcome)),
                None => Poll::Pending,
            }
        })
        .await
    }

    /// Number of completions that arrived with nothing armed
    pub fn spurious(&self) -> u32 {
        self.spurious.load(Ordering::Relaxed)
    }
}

impl EventSink for CompletionSignal {
    fn notify(&self, event: TransferEvent) {
        self.complete(event.into());
    }
}
