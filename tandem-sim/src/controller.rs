//! Simulated I3C controller
//!
//! Implements [`I3cController`] against an [`EchoTarget`]. Every call is
//! logged, and a [`FaultPlan`] can make chosen calls fail. Completions are
//! delivered inline (inside the issuing call) or through an [`IrqLine`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tandem_hal::{Control, DriverVersion, EventSink, I3cController, PowerState, TransferEvent};
use tracing::{debug, warn};

use crate::irq::IrqLine;
use crate::target::EchoTarget;

/// Reported driver version
pub const SIM_VERSION: DriverVersion = DriverVersion {
    api: 0x0100,
    driver: 0x0100,
};

/// Controller operations that faults can be planned against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOp {
    Initialize,
    PowerUp,
    PowerDown,
    Configure,
    Assign,
    Transmit,
    Receive,
    Uninitialize,
}

/// How a planned fault manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// The call returns `Err`
    Reject,
    /// The call is accepted and completes with [`TransferEvent::Error`]
    Error,
    /// The call is accepted and never completes
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlannedFault {
    op: SimOp,
    occurrence: u32,
    injection: Injection,
}

/// Faults to inject, keyed by operation and occurrence (1-based)
///
/// Synchronous operations only support rejection; any injection on them
/// rejects the call.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Vec<PlannedFault>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject `injection` on the `occurrence`-th call of `op`
    pub fn inject(mut self, op: SimOp, occurrence: u32, injection: Injection) -> Self {
        self.faults.push(PlannedFault {
            op,
            occurrence,
            injection,
        });
        self
    }

    fn lookup(&self, op: SimOp, occurrence: u32) -> Option<Injection> {
        self.faults
            .iter()
            .find(|f| f.op == op && f.occurrence == occurrence)
            .map(|f| f.injection)
    }
}

/// Recorded controller call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Initialize,
    Power(PowerState),
    Control(Control),
    Assign { static_address: u8 },
    Transmit { address: u8, len: usize },
    Receive { address: u8, len: usize },
    Uninitialize,
}

/// Simulated controller errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// Rejected by the fault plan
    Injected(SimOp),
    /// Driver not initialized
    NotInitialized,
    /// Peripheral not at full power
    PoweredOff,
    /// A previous request has not completed yet
    Busy,
}

/// Simulated I3C controller with one echoing target attached
pub struct SimController<'a, const CAP: usize = 16> {
    target: EchoTarget<CAP>,
    plan: FaultPlan,
    sink: Option<&'a dyn EventSink>,
    power: PowerState,
    legacy_clock_hz: Option<u32>,
    in_flight: Arc<AtomicBool>,
    irq: Option<IrqLine<'a>>,
    calls: Vec<Call>,
    counts: [u32; 8],
    overlaps: u32,
}

impl<'a, const CAP: usize> SimController<'a, CAP> {
    /// Create a controller that completes requests inline
    pub fn new(target: EchoTarget<CAP>) -> Self {
        Self {
            target,
            plan: FaultPlan::default(),
            sink: None,
            power: PowerState::Off,
            legacy_clock_hz: None,
            in_flight: Arc::new(AtomicBool::new(false)),
            irq: None,
            calls: Vec::new(),
            counts: [0; 8],
            overlaps: 0,
        }
    }

    pub fn with_plan(mut self, plan: FaultPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn target(&self) -> &EchoTarget<CAP> {
        &self.target
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Issuing calls made while another request was still in flight
    pub fn overlaps(&self) -> u32 {
        self.overlaps
    }

    pub fn power(&self) -> PowerState {
        self.power
    }

    /// Legacy I2C clock of the configured bus mode, `None` on a pure bus
    pub fn legacy_clock_hz(&self) -> Option<u32> {
        self.legacy_clock_hz
    }

    fn count(&mut self, op: SimOp) -> Option<Injection> {
        let slot = &mut self.counts[op as usize];
        *slot += 1;
        self.plan.lookup(op, *slot)
    }

    /// Common entry for synchronous calls
    fn sync_call(&mut self, op: SimOp) -> Result<(), SimError> {
        match self.count(op) {
            Some(injection) => {
                debug!(?op, ?injection, "injected rejection");
                Err(SimError::Injected(op))
            }
            None => Ok(()),
        }
    }

    /// Common entry for issuing calls
    ///
    /// On `Ok` the request is in flight and the injection (if any) applies
    /// to its completion.
    fn begin(&mut self, op: SimOp) -> Result<Option<Injection>, SimError> {
        let injection = self.count(op);
        if injection == Some(Injection::Reject) {
            debug!(?op, "injected rejection");
            return Err(SimError::Injected(op));
        }
        if self.sink.is_none() {
            return Err(SimError::NotInitialized);
        }
        if self.power != PowerState::Full {
            return Err(SimError::PoweredOff);
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!(?op, "request issued while another is in flight");
            self.overlaps += 1;
            return Err(SimError::Busy);
        }
        Ok(injection)
    }

    /// Complete an issued request
    fn finish(&mut self, injection: Option<Injection>, acked: bool) {
        let event = match injection {
            Some(Injection::Silent) => {
                debug!("completion withheld");
                return;
            }
            Some(Injection::Error) => TransferEvent::Error,
            _ if !acked => TransferEvent::Error,
            _ => TransferEvent::Done,
        };

        let Some(sink) = self.sink else {
            return;
        };
        match &self.irq {
            Some(irq) => {
                if !irq.raise(sink, event) {
                    warn!("interrupt line down, completion lost");
                }
            }
            None => {
                self.in_flight.store(false, Ordering::Release);
                sink.notify(event);
            }
        }
    }
}

impl<const CAP: usize> SimController<'static, CAP> {
    /// Deliver completions from a separate thread after `latency`
    pub fn deferred(mut self, latency: Duration) -> Self {
        self.irq = Some(IrqLine::spawn(latency, self.in_flight.clone()));
        self
    }
}

impl<'a, const CAP: usize> I3cController<'a> for SimController<'a, CAP> {
    type Error = SimError;

    fn version(&self) -> DriverVersion {
        SIM_VERSION
    }

    fn initialize(&mut self, sink: &'a dyn EventSink) -> Result<(), SimError> {
        self.calls.push(Call::Initialize);
        self.sync_call(SimOp::Initialize)?;
        self.sink = Some(sink);
        Ok(())
    }

    fn power_control(&mut self, state: PowerState) -> Result<(), SimError> {
        self.calls.push(Call::Power(state));
        let op = match state {
            PowerState::Full => SimOp::PowerUp,
            PowerState::Off | PowerState::Low => SimOp::PowerDown,
        };
        self.sync_call(op)?;
        if self.sink.is_none() {
            return Err(SimError::NotInitialized);
        }

        self.power = state;
        if state == PowerState::Off {
            self.target.reset();
        }
        Ok(())
    }

    fn control(&mut self, control: Control) -> Result<(), SimError> {
        self.calls.push(Call::Control(control));
        self.sync_call(SimOp::Configure)?;
        if self.power != PowerState::Full {
            return Err(SimError::PoweredOff);
        }

        let Control::SetBusMode(mode) = control;
        self.legacy_clock_hz = mode.legacy_clock_hz();
        debug!(?mode, legacy_clock_hz = ?self.legacy_clock_hz, "bus mode set");
        Ok(())
    }

    fn assign_dynamic_address(&mut self, static_address: u8) -> Result<u8, SimError> {
        self.calls.push(Call::Assign { static_address });
        let injection = self.begin(SimOp::Assign)?;

        let acked = self.target.assign(static_address);
        let address = self.target.planned_address();
        self.finish(injection, acked);
        Ok(address)
    }

    fn transmit(&mut self, address: u8, data: &[u8]) -> Result<(), SimError> {
        self.calls.push(Call::Transmit {
            address,
            len: data.len(),
        });
        let injection = self.begin(SimOp::Transmit)?;

        let acked = self.target.write(address, data);
        self.finish(injection, acked);
        Ok(())
    }

    fn receive(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), SimError> {
        self.calls.push(Call::Receive {
            address,
            len: buffer.len(),
        });
        let injection = self.begin(SimOp::Receive)?;

        let acked = self.target.read(address, buffer);
        self.finish(injection, acked);
        Ok(())
    }

    fn uninitialize(&mut self) -> Result<(), SimError> {
        self.calls.push(Call::Uninitialize);
        self.sync_call(SimOp::Uninitialize)?;
        self.sink = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{CompletionSignal, Outcome};
    use tandem_hal::BusMode;

    fn controller<'a>() -> SimController<'a, 8> {
        SimController::new(EchoTarget::new(0x48, 0x08))
    }

    #[test]
    fn test_issue_requires_power() {
        let signal = CompletionSignal::new();
        let mut ctrl = controller();
        ctrl.initialize(&signal).unwrap();

        assert_eq!(ctrl.transmit(0x08, &[1]), Err(SimError::PoweredOff));
        assert_eq!(ctrl.overlaps(), 0);
    }

    #[test]
    fn test_inline_completion() {
        let signal = CompletionSignal::new();
        let mut ctrl = controller();
        ctrl.initialize(&signal).unwrap();
        ctrl.power_control(PowerState::Full).unwrap();

        signal.arm().unwrap();
        assert_eq!(ctrl.assign_dynamic_address(0x48), Ok(0x08));
        assert_eq!(signal.try_take(), Some(Outcome::Success));

        signal.arm().unwrap();
        ctrl.transmit(0x08, &[9, 8]).unwrap();
        assert_eq!(signal.try_take(), Some(Outcome::Success));
        assert_eq!(ctrl.target().stored(), &[9, 8]);
    }

    #[test]
    fn test_nack_completes_with_error() {
        let signal = CompletionSignal::new();
        let mut ctrl = controller();
        ctrl.initialize(&signal).unwrap();
        ctrl.power_control(PowerState::Full).unwrap();

        // Not assigned yet
        signal.arm().unwrap();
        ctrl.transmit(0x08, &[1]).unwrap();
        assert_eq!(signal.try_take(), Some(Outcome::Error));
    }

    #[test]
    fn test_overlap_detected() {
        let signal = CompletionSignal::new();
        let plan = FaultPlan::new().inject(SimOp::Assign, 1, Injection::Silent);
        let mut ctrl = controller().with_plan(plan);
        ctrl.initialize(&signal).unwrap();
        ctrl.power_control(PowerState::Full).unwrap();

        ctrl.assign_dynamic_address(0x48).unwrap();
        assert_eq!(ctrl.assign_dynamic_address(0x48), Err(SimError::Busy));
        assert_eq!(ctrl.overlaps(), 1);
    }

    #[test]
    fn test_planned_rejection_counts_occurrences() {
        let signal = CompletionSignal::new();
        let plan = FaultPlan::new().inject(SimOp::PowerUp, 2, Injection::Reject);
        let mut ctrl = controller().with_plan(plan);
        ctrl.initialize(&signal).unwrap();

        assert!(ctrl.power_control(PowerState::Full).is_ok());
        assert_eq!(
            ctrl.power_control(PowerState::Full),
            Err(SimError::Injected(SimOp::PowerUp))
        );
    }

    #[test]
    fn test_bus_mode_sets_legacy_clock() {
        let signal = CompletionSignal::new();
        let mut ctrl = controller();
        ctrl.initialize(&signal).unwrap();

        let mode = Control::SetBusMode(BusMode::MixedFast);
        assert_eq!(ctrl.control(mode), Err(SimError::PoweredOff));

        ctrl.power_control(PowerState::Full).unwrap();
        ctrl.control(mode).unwrap();
        assert_eq!(ctrl.legacy_clock_hz(), Some(400_000));

        ctrl.control(Control::SetBusMode(BusMode::Pure)).unwrap();
        assert_eq!(ctrl.legacy_clock_hz(), None);
    }

    #[test]
    fn test_power_off_resets_target() {
        let signal = CompletionSignal::new();
        let mut ctrl = controller();
        ctrl.initialize(&signal).unwrap();
        ctrl.power_control(PowerState::Full).unwrap();
        signal.arm().unwrap();
        ctrl.assign_dynamic_address(0x48).unwrap();
        signal.try_take();

        ctrl.power_control(PowerState::Off).unwrap();
        assert_eq!(ctrl.target().dynamic_address(), None);
        assert_eq!(
            ctrl.calls().last(),
            Some(&Call::Power(PowerState::Off))
        );
    }
}
