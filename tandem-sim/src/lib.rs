//! Tandem Sim - host-side loopback harness
//!
//! Runs the Tandem loopback session against a simulated I3C controller with
//! one echoing target attached:
//! - [`EchoTarget`]: target model (address assignment, echo storage)
//! - [`SimController`]: controller with call log and fault injection
//! - [`IrqLine`]: deferred completion delivery from a separate thread
//! - [`TokioDelay`]: session time source
//! - [`config`]: TOML configuration

pub mod config;
pub mod controller;
pub mod delay;
pub mod irq;
pub mod target;

use std::time::Duration;

pub use config::{SimConfig, SimSettings};
pub use controller::{Call, FaultPlan, Injection, SimController, SimError, SimOp};
pub use delay::TokioDelay;
pub use irq::IrqLine;
pub use target::EchoTarget;

/// Echo storage capacity of the simulated target
pub const TARGET_CAPACITY: usize = 16;

/// Build the echo target described by `config`
pub fn build_target(config: &SimConfig) -> EchoTarget<TARGET_CAPACITY> {
    EchoTarget::new(config.session.static_address, config.sim.dynamic_address)
        .nack_first_assign(config.sim.nack_first_assign)
        .corrupt_at(config.sim.corrupt_at)
}

/// Build the simulated controller described by `config`
pub fn build_controller(config: &SimConfig, plan: FaultPlan) -> SimController<'static> {
    let controller = SimController::new(build_target(config)).with_plan(plan);
    match config.sim.latency_us {
        Some(us) => controller.deferred(Duration::from_micros(us.into())),
        None => controller,
    }
}
