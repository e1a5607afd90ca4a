//! Device drivers.
//!
//! The radio transports are opaque to the player.  [`simulated`] provides an
//! in-process device that behaves like a hub (connection latency, failures,
//! link loss) and records the outputs it receives.

pub mod simulated;

pub use simulated::SimulatedDevice;
