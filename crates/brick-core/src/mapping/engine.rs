//! The mapping engine: controller event batches in, channel outputs out.
//!
//! # Processing order
//!
//! For every event in a batch (in batch order), for every binding in the
//! profile that matches the event's type and code (in profile order), for
//! every action of that binding (in action order) the engine computes an
//! output and writes it to the action's device channel.
//!
//! # Ownership
//!
//! The engine mutates its button histories and axis contributions through
//! `&mut self`.  The application runs it on exactly one task, which is what
//! keeps those tables consistent without locks.

use tracing::{debug, trace};

use crate::domain::device::DeviceId;
use crate::domain::event::{ControllerEventBatch, ControllerEventType, EventKey};
use crate::domain::profile::{ControllerAction, ControllerProfile};

use super::axis::{adjust_output, shape_axis, AxisContributions};
use super::button::{is_pressed, should_process, ButtonHistories};

/// Where the engine sends computed outputs.
///
/// The application implements this over its live device handles; tests use
/// the generated `MockOutputSink`.
#[cfg_attr(test, mockall::automock)]
pub trait OutputSink {
    /// Returns `true` when `device_id` names a device the sink can drive.
    fn has_device(&self, device_id: &DeviceId) -> bool;

    /// Sets `channel` of `device_id` to `value` in `[-1, 1]`.
    fn set_output(&self, device_id: &DeviceId, channel: u8, value: f32);
}

/// Maps controller events to device outputs according to one profile.
#[derive(Debug)]
pub struct MappingEngine {
    profile: ControllerProfile,
    buttons: ButtonHistories,
    axes: AxisContributions,
}

impl MappingEngine {
    pub fn new(profile: ControllerProfile) -> Self {
        Self {
            profile,
            buttons: ButtonHistories::new(),
            axes: AxisContributions::new(),
        }
    }

    /// Processes every event of `batch`.
    ///
    /// Actions naming a device the sink does not know are skipped without
    /// touching any state; the remaining actions still run.
    pub fn process_batch(&mut self, batch: &ControllerEventBatch, sink: &dyn OutputSink) {
        for (key, value) in batch.iter() {
            self.process_event(key, value, sink);
        }
    }

    /// Processes a single event.
    pub fn process_event(&mut self, key: &EventKey, value: f32, sink: &dyn OutputSink) {
        // Split borrows: the profile is read while the tables are written.
        let Self {
            profile,
            buttons,
            axes,
        } = self;

        for binding in profile.bindings_for(key) {
            for action in &binding.actions {
                if !sink.has_device(&action.device_id) {
                    debug!(
                        device = %action.device_id,
                        event = %key,
                        "skipping action for unknown device"
                    );
                    continue;
                }

                let output = match key.event_type {
                    ControllerEventType::Button => {
                        let pressed = is_pressed(value);
                        if !should_process(action.button_type, pressed) {
                            continue;
                        }
                        let raw = buttons.step(&key.code, action.button_type, pressed);
                        adjust_output(raw, action)
                    }
                    ControllerEventType::Axis => {
                        let shaped = shape_axis(value, action);
                        axes.store(&action.device_id, action.channel, key, shaped)
                    }
                };

                emit(sink, action, output);
            }
        }
    }
}

fn emit(sink: &dyn OutputSink, action: &ControllerAction, value: f32) {
    trace!(
        device = %action.device_id,
        channel = action.channel,
        value,
        "set output"
    );
    sink.set_output(&action.device_id, action.channel, value);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
