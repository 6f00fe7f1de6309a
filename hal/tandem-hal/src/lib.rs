//! Tandem Hardware Abstraction Layer
//!
//! This crate defines the capability interface of an I3C bus controller as
//! consumed by the loopback session in `tandem-core`. Chip-specific drivers
//! (or the host simulator in `tandem-sim`) implement it, so the same session
//! logic runs against real silicon and in host tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Session (tandem-core)                  │
//! └─────────────────────────────────────────┘
//!           │ issue              ▲ notify
//!           ▼                    │
//! ┌─────────────────────────────────────────┐
//! │  tandem-hal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ chip driver   │       │  tandem-sim   │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`i3c::I3cController`] - Controller-side bus operations
//! - [`i3c::EventSink`] - Completion notification callback

#![no_std]
#![deny(unsafe_code)]

pub mod i3c;

pub use i3c::{
    BusMode, Control, DriverVersion, EventSink, I3cController, PowerState, TransferEvent,
};
