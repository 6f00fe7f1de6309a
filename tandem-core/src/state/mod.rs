//! Session state machine
//!
//! Tracks where the loopback session is in its lifecycle.
//! The state machine is explicit, finite, and deterministic.

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::State;
