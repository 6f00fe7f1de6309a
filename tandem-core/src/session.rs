//! Loopback session
//!
//! Drives an I3C controller through bring-up, dynamic address assignment and
//! an endless transmit/receive/verify exchange with a single echoing target.
//!
//! Exactly one bus operation is in flight at any time: the completion signal
//! is armed before every issuing call and consumed before the next one, so
//! each notification belongs to the operation just issued.

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;
use tandem_hal::{Control, I3cController, PowerState};

use crate::buffer::{TransferBuffer, DEFAULT_SEED, DEFAULT_TRANSFER_LEN};
use crate::config::SessionConfig;
use crate::error::{
    Cause, CleanupReport, CleanupStep, Fault, FaultKind, Operation, SessionError,
};
use crate::signal::{CompletionSignal, Outcome};
use crate::state::{Event, State};

/// Number of dynamic address assignment rounds
///
/// The target does not acknowledge the first assignment after power-up, so
/// assignment is always issued twice and only the second round counts.
pub const ASSIGN_ROUNDS: u8 = 2;

/// Completed transfer counts (diagnostic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    /// Successful transmits
    pub tx: u32,
    /// Successful receives
    pub rx: u32,
}

/// Summary of a session that stopped cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionReport<E> {
    /// Dynamic address the target was given
    pub peer_address: u8,
    /// Verified exchanges
    pub iterations: u32,
    /// Completed transfers
    pub counters: Counters,
    /// Outcome of the final power-down and uninitialize
    pub cleanup: CleanupReport<E>,
}

/// Controller-side loopback session
///
/// Owns the controller, delay source, buffers and counters; borrows the
/// completion signal, which is registered with the controller as its sink.
pub struct Session<'a, C, D, const N: usize = DEFAULT_TRANSFER_LEN>
where
    C: I3cController<'a>,
    D: DelayNs,
{
    controller: C,
    delay: D,
    signal: &'a CompletionSignal,
    config: SessionConfig,
    state: State,
    peer_address: Option<u8>,
    tx: TransferBuffer<N>,
    rx: TransferBuffer<N>,
    counters: Counters,
    iterations: u32,
}

impl<'a, C, D> Session<'a, C, D, DEFAULT_TRANSFER_LEN>
where
    C: I3cController<'a>,
    D: DelayNs,
{
    /// Create a session with the default 4-byte payload `[0, 1, 2, 3]`
    pub fn new(controller: C, delay: D, signal: &'a CompletionSignal, config: SessionConfig) -> Self {
        Self::with_seed(controller, delay, signal, config, DEFAULT_SEED)
    }
}

impl<'a, C, D, const N: usize> Session<'a, C, D, N>
where
    C: I3cController<'a>,
    D: DelayNs,
{
    /// Create a session with an `N`-byte initial payload
    ///
    /// The payload is advanced before the first transmit, so `seed` itself
    /// is never sent.
    pub fn with_seed(
        controller: C,
        delay: D,
        signal: &'a CompletionSignal,
        config: SessionConfig,
        seed: [u8; N],
    ) -> Self {
        Self {
            controller,
            delay,
            signal,
            config,
            state: State::Uninit,
            peer_address: None,
            tx: TransferBuffer::new(seed),
            rx: TransferBuffer::zeroed(),
            counters: Counters::default(),
            iterations: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Verified exchanges so far
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Dynamic address of the target, once assigned
    pub fn peer_address(&self) -> Option<u8> {
        self.peer_address
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Last payload sent
    pub fn tx_buffer(&self) -> &TransferBuffer<N> {
        &self.tx
    }

    /// Last payload received
    pub fn rx_buffer(&self) -> &TransferBuffer<N> {
        &self.rx
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Consume the session and return the controller
    pub fn into_controller(self) -> C {
        self.controller
    }

    /// Run the session to completion
    ///
    /// The configuration is validated first; an invalid one aborts before
    /// any bus call. Without an iteration bound this only returns on a fault. With
    /// `max_iterations` set, the session unwinds cleanly once that many
    /// exchanges have been verified.
    pub async fn run(&mut self) -> Result<SessionReport<C::Error>, SessionError<C::Error>> {
        if self.state != State::Uninit {
            return Err(SessionError::Aborted {
                fault: Fault::new(FaultKind::Protocol, Operation::Initialize, Cause::InvalidState),
                cleanup: CleanupReport::skipped(),
            });
        }
        if let Err(e) = self.config.validate() {
            error!("Invalid session configuration: {:?}", e);
            return Err(SessionError::Aborted {
                fault: Fault::new(FaultKind::Protocol, Operation::Initialize, Cause::InvalidConfig(e)),
                cleanup: CleanupReport::skipped(),
            });
        }

        self.bring_up().await?;
        let peer_address = self.assign_address().await?;

        self.delay.delay_us(self.config.assign_settle_us).await;
        self.advance(Event::StartTransfers);
        info!("Entering loopback with target {:#x}", peer_address);

        while self
            .config
            .max_iterations
            .map_or(true, |max| self.iterations < max)
        {
            self.exchange(peer_address).await?;
        }

        info!(
            "Loopback finished after {} exchanges (tx={}, rx={})",
            self.iterations,
            self.counters.tx,
            self.counters.rx
        );
        let cleanup = self.unwind();

        Ok(SessionReport {
            peer_address,
            iterations: self.iterations,
            counters: self.counters,
            cleanup,
        })
    }

    /// Initialize, power up and configure the bus
    async fn bring_up(&mut self) -> Result<(), SessionError<C::Error>> {
        let version = self.controller.version();
        info!(
            "I3C driver api {:#x} driver {:#x}",
            version.api,
            version.driver
        );

        if let Err(e) = self.controller.initialize(self.signal) {
            error!("I3C initialize failed");
            return Err(self.abort(FaultKind::Init, Operation::Initialize, Cause::Rejected(e)));
        }
        self.advance(Event::Initialized);

        if let Err(e) = self.controller.power_control(PowerState::Full) {
            error!("I3C power up failed");
            return Err(self.abort(FaultKind::Power, Operation::PowerUp, Cause::Rejected(e)));
        }
        self.advance(Event::PoweredUp);

        let mode = self.config.bus_mode;
        if let Err(e) = self.controller.control(Control::SetBusMode(mode)) {
            error!("I3C bus mode {:?} rejected", mode);
            return Err(self.abort(FaultKind::BusConfig, Operation::Configure, Cause::Rejected(e)));
        }
        self.delay.delay_us(self.config.bus_settle_us).await;
        self.advance(Event::BusConfigured);
        debug!("Bus configured in {:?} mode", mode);

        Ok(())
    }

    /// Dynamic address assignment, always two rounds
    async fn assign_address(&mut self) -> Result<u8, SessionError<C::Error>> {
        let static_address = self.config.static_address;
        info!("Requesting dynamic address for static address {:#x}", static_address);

        let mut resolved = 0;
        for round in 1..=ASSIGN_ROUNDS {
            self.arm(Operation::AssignAddress)?;
            resolved = match self.controller.assign_dynamic_address(static_address) {
                Ok(address) => address,
                Err(e) => {
                    error!("Address assignment round {} rejected", round);
                    return Err(self.reject(FaultKind::AddressAssignment, Operation::AssignAddress, e));
                }
            };
            self.advance(Event::AssignIssued);

            let outcome = self
                .await_completion(Operation::AssignAddress)
                .await?;

            if round < ASSIGN_ROUNDS {
                // Not authoritative: the target does not ACK the first round
                debug!(
                    "Assignment round {} -> {:#x} ({:?}), repeating",
                    round,
                    resolved,
                    outcome
                );
                self.delay.delay_us(self.config.assign_settle_us).await;
                continue;
            }

            if outcome == Outcome::Error {
                error!("Address assignment failed for {:#x}", static_address);
                return Err(self.halt(
                    FaultKind::AddressAssignment,
                    Operation::AssignAddress,
                    Cause::Completion,
                ));
            }
        }

        info!(
            "Target {:#x} assigned dynamic address {:#x}",
            static_address,
            resolved
        );
        self.peer_address = Some(resolved);
        self.advance(Event::AddressAssigned);
        Ok(resolved)
    }

    /// One transmit/receive/verify exchange
    async fn exchange(&mut self, peer_address: u8) -> Result<(), SessionError<C::Error>> {
        self.delay.delay_us(self.config.iteration_delay_us).await;

        self.tx.advance();
        self.arm(Operation::Transmit)?;
        if let Err(e) = self.controller.transmit(peer_address, self.tx.as_slice()) {
            error!("Transmit rejected");
            return Err(self.reject(FaultKind::Transmit, Operation::Transmit, e));
        }
        if self.await_completion(Operation::Transmit).await? == Outcome::Error {
            error!("Transmit failed after {} exchanges", self.iterations);
            return Err(self.halt(FaultKind::Transmit, Operation::Transmit, Cause::Completion));
        }
        self.counters.tx = self.counters.tx.saturating_add(1);
        self.advance(Event::TransmitDone);

        self.delay.delay_us(self.config.turnaround_delay_us).await;

        self.rx.clear();
        self.arm(Operation::Receive)?;
        if let Err(e) = self.controller.receive(peer_address, self.rx.as_mut_slice()) {
            error!("Receive rejected");
            return Err(self.reject(FaultKind::Receive, Operation::Receive, e));
        }
        if self.await_completion(Operation::Receive).await? == Outcome::Error {
            error!("Receive failed after {} exchanges", self.iterations);
            return Err(self.halt(FaultKind::Receive, Operation::Receive, Cause::Completion));
        }
        self.counters.rx = self.counters.rx.saturating_add(1);

        if let Err(mismatch) = self.tx.compare(&self.rx) {
            error!(
                "TX/RX mismatch at byte {}: sent {:#x}, got {:#x}",
                mismatch.index,
                mismatch.expected,
                mismatch.actual
            );
            return Err(self.halt(
                FaultKind::IntegrityMismatch,
                Operation::Verify,
                Cause::Mismatch(mismatch),
            ));
        }

        self.iterations = self.iterations.saturating_add(1);
        self.advance(Event::Verified);
        trace!("Exchange {} verified", self.iterations);
        Ok(())
    }

    /// Check the state allows a bus request, then reset the completion signal
    fn arm(&mut self, operation: Operation) -> Result<(), SessionError<C::Error>> {
        if !self.state.may_transfer() {
            error!("{:?} not allowed in state {:?}", operation, self.state);
            return Err(self.abort(FaultKind::Protocol, operation, Cause::InvalidState));
        }

        self.signal.arm().map_err(|_| {
            error!("Completion signal still holds a previous outcome");
            self.abort(FaultKind::Protocol, operation, Cause::Signal)
        })
    }

    /// Wait for the armed operation, bounded if a timeout is configured
    async fn await_completion(&mut self, operation: Operation) -> Result<Outcome, SessionError<C::Error>> {
        let signal = self.signal;
        let waited = match self.config.completion_timeout_us {
            None => signal.wait().await,
            Some(timeout_us) => match select(signal.wait(), self.delay.delay_us(timeout_us)).await {
                Either::First(waited) => waited,
                Either::Second(()) => {
                    signal.disarm();
                    error!("No completion for {:?} within {} us", operation, timeout_us);
                    return Err(self.halt(FaultKind::Timeout(operation), operation, Cause::TimedOut));
                }
            },
        };

        match waited {
            Ok(outcome) => {
                trace!("{:?} completed: {:?}", operation, outcome);
                Ok(outcome)
            }
            Err(_) => {
                error!("Completion signal was not armed for {:?}", operation);
                Err(self.halt(FaultKind::Protocol, operation, Cause::Signal))
            }
        }
    }

    /// The driver refused an issuing call: nothing is in flight
    fn reject(&mut self, kind: FaultKind, operation: Operation, error: C::Error) -> SessionError<C::Error> {
        self.signal.disarm();
        self.abort(kind, operation, Cause::Rejected(error))
    }

    /// Record a recoverable fault and unwind
    fn abort(&mut self, kind: FaultKind, operation: Operation, cause: Cause<C::Error>) -> SessionError<C::Error> {
        self.advance(Event::Fault(kind));
        let cleanup = self.unwind();
        SessionError::Aborted {
            fault: Fault::new(kind, operation, cause),
            cleanup,
        }
    }

    /// Record an unrecoverable fault; no further bus calls are made
    fn halt(&mut self, kind: FaultKind, operation: Operation, cause: Cause<C::Error>) -> SessionError<C::Error> {
        self.advance(Event::Halt(kind));
        error!(
            "Session halted: {:?} (tx={}, rx={})",
            kind,
            self.counters.tx,
            self.counters.rx
        );
        SessionError::Halted {
            fault: Fault::new(kind, operation, cause),
        }
    }

    /// Best-effort cleanup: power down (if powered), then uninitialize
    fn unwind(&mut self) -> CleanupReport<C::Error> {
        let mut report = CleanupReport::skipped();

        // Driver never initialized
        if self.state.is_terminal() {
            return report;
        }

        if self.state.is_powered() {
            report.power_down = match self.controller.power_control(PowerState::Off) {
                Ok(()) => CleanupStep::Done,
                Err(e) => {
                    warn!("I3C power off failed");
                    CleanupStep::Failed(e)
                }
            };
            self.advance(Event::PoweredDown);
        }

        report.uninitialize = match self.controller.uninitialize() {
            Ok(()) => CleanupStep::Done,
            Err(e) => {
                warn!("I3C uninitialize failed");
                CleanupStep::Failed(e)
            }
        };
        self.advance(Event::Uninitialized);

        info!("I3C session exiting");
        report
    }

    fn advance(&mut self, event: Event) {
        let next = self.state.transition(event);
        trace!("{:?} --{:?}--> {:?}", self.state, event, next);
        self.state = next;
    }
}
