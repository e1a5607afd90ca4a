//! Controller profiles.
//!
//! A profile binds controller inputs to device channels.  Each
//! [`ControllerEventBinding`] matches one `(event type, event code)` pair and
//! carries a list of [`ControllerAction`]s; every action drives one channel of
//! one device.  Profiles are static for the lifetime of a play session.
//!
//! Profiles are usually loaded from TOML:
//!
//! ```toml
//! name = "Crane"
//!
//! [[bindings]]
//! event_type = "Axis"
//! event_code = "X"
//!
//! [[bindings.actions]]
//! device_id = "hub-1"
//! channel = 0
//! axis_characteristic = "Exponential"
//! axis_dead_zone_percent = 10
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::device::DeviceId;
use super::event::{ControllerEventType, EventKey};

/// How a button press is turned into an output value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ButtonType {
    /// Output follows the button: `1` while held, `0` when released.
    #[default]
    Normal,
    /// Each press flips between `0` and `1`.
    SimpleToggle,
    /// Each press flips between `-1` and `1`.
    Alternating,
    /// Each press steps `1 → -1 → 0 → 1`.
    Circular,
    /// Each press steps through `-1, 0, 1, 0, -1, …`.
    PingPong,
}

/// Response curve applied to an axis value after the dead zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AxisCharacteristic {
    #[default]
    Linear,
    /// `v·|v|`: finer control near the centre.
    Exponential,
    /// `sign(v)·√|v|`: faster response near the centre.
    Logarithmic,
}

/// One output effect of a binding: drive `channel` of `device_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerAction {
    pub device_id: DeviceId,
    pub channel: u8,
    #[serde(default)]
    pub button_type: ButtonType,
    #[serde(default)]
    pub axis_characteristic: AxisCharacteristic,
    /// Dead zone in percent of the full axis range (`0..=99`).
    #[serde(default)]
    pub axis_dead_zone_percent: u8,
    /// Output ceiling in percent (`0..=100`).
    #[serde(default = "default_max_output_percent")]
    pub max_output_percent: u8,
    #[serde(default)]
    pub is_invert: bool,
}

fn default_max_output_percent() -> u8 {
    100
}

impl ControllerAction {
    /// Creates an action with default shaping: `Normal` button, `Linear`
    /// axis, no dead zone, full output, not inverted.
    pub fn new(device_id: impl Into<DeviceId>, channel: u8) -> Self {
        Self {
            device_id: device_id.into(),
            channel,
            button_type: ButtonType::default(),
            axis_characteristic: AxisCharacteristic::default(),
            axis_dead_zone_percent: 0,
            max_output_percent: default_max_output_percent(),
            is_invert: false,
        }
    }

    pub fn with_button_type(mut self, button_type: ButtonType) -> Self {
        self.button_type = button_type;
        self
    }

    pub fn with_axis_characteristic(mut self, characteristic: AxisCharacteristic) -> Self {
        self.axis_characteristic = characteristic;
        self
    }

    pub fn with_dead_zone(mut self, percent: u8) -> Self {
        self.axis_dead_zone_percent = percent;
        self
    }

    pub fn with_max_output(mut self, percent: u8) -> Self {
        self.max_output_percent = percent;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.is_invert = true;
        self
    }
}

/// Binds one controller input to a list of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerEventBinding {
    pub event_type: ControllerEventType,
    pub event_code: String,
    #[serde(default)]
    pub actions: Vec<ControllerAction>,
}

impl ControllerEventBinding {
    pub fn new(event_type: ControllerEventType, event_code: impl Into<String>) -> Self {
        Self {
            event_type,
            event_code: event_code.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ControllerAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Returns `true` when this binding reacts to `key`.
    pub fn matches(&self, key: &EventKey) -> bool {
        self.event_type == key.event_type && self.event_code == key.code
    }
}

/// An ordered list of bindings used for one play session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bindings: Vec<ControllerEventBinding>,
}

/// Errors found while validating a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("binding {binding} ({code}): action {action} has an empty device id")]
    EmptyDeviceId {
        binding: usize,
        code: String,
        action: usize,
    },

    #[error("binding {binding} ({code}): dead zone {value}% is outside 0..=99")]
    DeadZoneOutOfRange {
        binding: usize,
        code: String,
        value: u8,
    },

    #[error("binding {binding} ({code}): max output {value}% is outside 0..=100")]
    MaxOutputOutOfRange {
        binding: usize,
        code: String,
        value: u8,
    },
}

impl ControllerProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    pub fn with_binding(mut self, binding: ControllerEventBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Checks every action for out-of-range shaping parameters.
    ///
    /// # Errors
    ///
    /// Returns the first offending action as a [`ProfileError`].
    pub fn validate(&self) -> Result<(), ProfileError> {
        for (b, binding) in self.bindings.iter().enumerate() {
            for (a, action) in binding.actions.iter().enumerate() {
                if action.device_id.as_str().trim().is_empty() {
                    return Err(ProfileError::EmptyDeviceId {
                        binding: b,
                        code: binding.event_code.clone(),
                        action: a,
                    });
                }
                if action.axis_dead_zone_percent > 99 {
                    return Err(ProfileError::DeadZoneOutOfRange {
                        binding: b,
                        code: binding.event_code.clone(),
                        value: action.axis_dead_zone_percent,
                    });
                }
                if action.max_output_percent > 100 {
                    return Err(ProfileError::MaxOutputOutOfRange {
                        binding: b,
                        code: binding.event_code.clone(),
                        value: action.max_output_percent,
                    });
                }
            }
        }
        Ok(())
    }

    /// Iterates the bindings that react to `key`, in profile order.
    pub fn bindings_for<'a>(
        &'a self,
        key: &'a EventKey,
    ) -> impl Iterator<Item = &'a ControllerEventBinding> + 'a {
        self.bindings.iter().filter(move |b| b.matches(key))
    }

    /// Every distinct device referenced by an action, in first-seen order.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = Vec::new();
        for action in self.bindings.iter().flat_map(|b| b.actions.iter()) {
            if !ids.contains(&action.device_id) {
                ids.push(action.device_id.clone());
            }
        }
        ids
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
