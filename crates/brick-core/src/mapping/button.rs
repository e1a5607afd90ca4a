//! Button state machine.
//!
//! Buttons other than [`ButtonType::Normal`] react to presses only.  Each
//! press steps a small state machine whose state is the last two outputs
//! produced for the same event code.

use std::collections::HashMap;

use crate::domain::profile::ButtonType;

/// A value above this threshold counts as "pressed".
pub const PRESS_THRESHOLD: f32 = 0.5;

/// Returns `true` when `value` represents a pressed button.
pub fn is_pressed(value: f32) -> bool {
    value > PRESS_THRESHOLD
}

/// Whether an event should reach the state machine at all.
///
/// `Normal` buttons see both presses and releases; every other type only
/// reacts to presses.
pub fn should_process(button_type: ButtonType, pressed: bool) -> bool {
    button_type == ButtonType::Normal || pressed
}

/// The last two outputs produced for one event code: `[current, previous]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ButtonHistory {
    pub current: f32,
    pub previous: f32,
}

impl ButtonHistory {
    /// Computes the next raw output (before adjustment) for a processed event.
    pub fn next_output(&self, button_type: ButtonType, pressed: bool) -> f32 {
        match button_type {
            ButtonType::Normal => {
                if pressed {
                    1.0
                } else {
                    0.0
                }
            }
            ButtonType::SimpleToggle => {
                if self.current != 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            ButtonType::Alternating => {
                if self.current < 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            ButtonType::Circular => {
                if self.current < 0.0 {
                    0.0
                } else if self.current == 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            ButtonType::PingPong => {
                if self.current != 0.0 {
                    0.0
                } else if self.previous < 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }

    /// Shifts `output` in as the new current value.
    pub fn push(&mut self, output: f32) {
        self.previous = self.current;
        self.current = output;
    }
}

/// Button histories keyed by event code.
///
/// All actions bound to the same code share one history, and every action
/// steps it.  Two `SimpleToggle` actions on one button therefore emit `1` and
/// then `0` for a single press.
#[derive(Debug, Default)]
pub struct ButtonHistories {
    by_code: HashMap<String, ButtonHistory>,
}

impl ButtonHistories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one processed event through the state machine for `code` and
    /// returns the raw output.
    pub fn step(&mut self, code: &str, button_type: ButtonType, pressed: bool) -> f32 {
        let history = self.by_code.entry(code.to_string()).or_default();
        let output = history.next_output(button_type, pressed);
        history.push(output);
        output
    }

    pub fn get(&self, code: &str) -> ButtonHistory {
        self.by_code.get(code).copied().unwrap_or_default()
    }
}
