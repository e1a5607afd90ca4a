//! Device vocabulary: identifiers, connection states, and state changes.
//!
//! The actual transport (Bluetooth LE, Infrared) is not modelled here.  The
//! application crate drives devices through a capability trait; this module
//! only defines the values that cross that boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a controllable device (e.g. a Bluetooth address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// How the host reaches a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Needs the host Bluetooth radio to be switched on.
    #[default]
    Bluetooth,
    Infrared,
}

impl DeviceKind {
    pub fn requires_bluetooth(self) -> bool {
        matches!(self, DeviceKind::Bluetooth)
    }
}

/// Connection state of a device.
///
/// Transitions follow `Disconnected → Connecting → Connected`; any state may
/// fall back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Disconnected => "Disconnected",
            DeviceState::Connecting => "Connecting",
            DeviceState::Connected => "Connected",
        };
        f.write_str(s)
    }
}

/// Outcome of a single device connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionResult {
    Ok,
    Error,
}

impl ConnectionResult {
    pub fn is_ok(self) -> bool {
        matches!(self, ConnectionResult::Ok)
    }
}

/// Notification that a device moved between connection states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStateChange {
    pub device_id: DeviceId,
    pub old_state: DeviceState,
    pub new_state: DeviceState,
    /// `true` when the transition was caused by a transport failure rather
    /// than a requested disconnect.
    pub is_error: bool,
}

impl DeviceStateChange {
    /// A drop to `Disconnected` caused by a failure.  The orchestrator reacts
    /// to these by reconnecting.
    pub fn is_error_disconnect(&self) -> bool {
        self.is_error && self.new_state == DeviceState::Disconnected
    }
}
