//! # brick-core
//!
//! Shared library for Brick Player containing the controller event model, the
//! event mapping engine, and the remote event ingestion protocol.
//!
//! This crate has no dependencies on sockets, async runtimes, or device
//! transports.  Everything here can be unit-tested in isolation.
//!
//! # Architecture overview (for beginners)
//!
//! Brick Player drives motorized toy devices (motors on Bluetooth or Infrared
//! receivers) from game-controller input.  Input arrives either from a local
//! game pad or from a phone/browser that sends tiny HTTP requests such as
//! `GET /Axis/X/-0.5/1700000000123`.
//!
//! - **`domain`** – The vocabulary shared by every layer: controller events,
//!   event batches, controller profiles (which input drives which device
//!   channel, and how), and device states.
//!
//! - **`mapping`** – The event mapping engine.  It turns controller events into
//!   output commands: button state machines (toggle, alternate, cycle…), axis
//!   dead zones and response curves, and the summing of several axes that
//!   drive the same channel.
//!
//! - **`protocol`** – How remote events travel over the network: decoding the
//!   `/Type/Key/Value/Sequence` request path, dropping stale events with a
//!   per-key sequence filter, and rendering the plain-text HTTP response.

pub mod domain;
pub mod mapping;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `brick_core::ControllerProfile` instead of the full module path.
pub use domain::device::{ConnectionResult, DeviceId, DeviceKind, DeviceState, DeviceStateChange};
pub use domain::event::{ControllerEvent, ControllerEventBatch, ControllerEventType, EventKey};
pub use domain::profile::{
    AxisCharacteristic, ButtonType, ControllerAction, ControllerEventBinding, ControllerProfile,
    ProfileError,
};
pub use mapping::engine::{MappingEngine, OutputSink};
pub use protocol::request::{decode_request_path, DecodedEvent, DecodedRequest};
pub use protocol::sequence::SequenceFilter;
