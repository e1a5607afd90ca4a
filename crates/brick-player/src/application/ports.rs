//! Capabilities the application layer needs from the outside world.
//!
//! Both traits are implemented by infrastructure (real radios, the console
//! front end) and by recording fakes in tests.

use async_trait::async_trait;
use brick_core::{ConnectionResult, DeviceId, DeviceKind, DeviceState, DeviceStateChange};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Output level applied to every group before the user picks one.
pub const DEFAULT_OUTPUT_LEVEL: u8 = 1;

/// A controllable device (motor hub) reachable over Bluetooth or Infrared.
///
/// The transport behind this trait is opaque to the application.
/// Implementations must be cheap to call from any task: `set_output` is
/// called on every mapped controller event.
#[async_trait]
pub trait Device: Send + Sync {
    /// Stable identifier referenced by profile actions.
    fn id(&self) -> &DeviceId;

    /// Human-readable name for logs.
    fn name(&self) -> &str;

    fn kind(&self) -> DeviceKind;

    /// Number of output channels (motors) the device exposes.
    fn channel_count(&self) -> u8;

    /// Devices that share an output level group (e.g. all hubs of one model
    /// with a power-level switch) have their level changed together.
    fn output_level_group(&self) -> Option<&str>;

    fn state(&self) -> DeviceState;

    /// Sets `channel` to `value` in `[-1, 1]`.
    fn set_output(&self, channel: u8, value: f32);

    /// Changes the device's power level.
    fn set_output_level(&self, level: u8);

    /// Connects the device.
    ///
    /// `reconnect` hints that the device was connected before in this session.
    /// Implementations must return promptly with [`ConnectionResult::Error`]
    /// once `token` is cancelled.
    async fn connect(&self, reconnect: bool, token: CancellationToken) -> ConnectionResult;

    /// Disconnects the device.  Disconnecting an already disconnected device
    /// is a no-op.
    async fn disconnect(&self);

    /// Subscribes to connection state changes.
    fn subscribe_state(&self) -> broadcast::Receiver<DeviceStateChange>;
}

/// Which long-running operation a progress indicator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressKind {
    Connecting,
    Disconnecting,
}

/// Callbacks from a play session to whatever front end hosts it.
pub trait SessionObserver: Send + Sync {
    /// A progress indicator should be shown.  When `cancel` is present the
    /// indicator is cancelable and cancelling the token aborts the operation.
    fn progress_started(&self, kind: ProgressKind, cancel: Option<CancellationToken>);

    fn progress_finished(&self, kind: ProgressKind);

    /// The session could not bring its devices up; leave the player.
    fn navigate_back(&self);
}
