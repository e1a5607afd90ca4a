//! Axis shaping and the per-channel contribution table.

use std::collections::HashMap;

use crate::domain::device::DeviceId;
use crate::domain::event::EventKey;
use crate::domain::profile::{AxisCharacteristic, ControllerAction};

/// Applies a dead zone given as a fraction of the full range.
///
/// Values inside `[-dead_zone, dead_zone]` become `0`; the remaining range is
/// rescaled so the output still reaches `±1`.  A non-positive dead zone leaves
/// the value untouched.
pub fn apply_dead_zone(value: f32, dead_zone: f32) -> f32 {
    if dead_zone <= 0.0 {
        return value;
    }
    if value.abs() <= dead_zone {
        return 0.0;
    }
    // A dead zone of the whole range leaves nothing to rescale.
    if dead_zone >= 1.0 {
        return 0.0;
    }
    if value < 0.0 {
        (value + dead_zone) / (1.0 - dead_zone)
    } else {
        (value - dead_zone) / (1.0 - dead_zone)
    }
}

/// Applies a response curve.
pub fn apply_curve(value: f32, characteristic: AxisCharacteristic) -> f32 {
    match characteristic {
        AxisCharacteristic::Linear => value,
        AxisCharacteristic::Exponential => value * value.abs(),
        AxisCharacteristic::Logarithmic => {
            if value < 0.0 {
                -value.abs().sqrt()
            } else {
                value.abs().sqrt()
            }
        }
    }
}

/// Scales by the action's max output and applies inversion.
pub fn adjust_output(value: f32, action: &ControllerAction) -> f32 {
    let value = if action.max_output_percent < 100 {
        value * f32::from(action.max_output_percent) / 100.0
    } else {
        value
    };
    if action.is_invert {
        -value
    } else {
        value
    }
}

/// Full axis pipeline for one action: dead zone, curve, adjustment.
///
/// A value swallowed by the dead zone is reported as a plain `0`.
pub fn shape_axis(value: f32, action: &ControllerAction) -> f32 {
    let dead_zone = f32::from(action.axis_dead_zone_percent) / 100.0;
    if dead_zone > 0.0 && value.abs() <= dead_zone {
        return 0.0;
    }
    let value = apply_dead_zone(value, dead_zone);
    adjust_output(apply_curve(value, action.axis_characteristic), action)
}

/// Remembers what each axis last contributed to each `(device, channel)`.
///
/// Several axes may drive the same channel (e.g. two triggers on one motor);
/// the channel output is the sum of all contributions clamped to `[-1, 1]`.
/// Entries are overwritten but never removed.
#[derive(Debug, Default)]
pub struct AxisContributions {
    table: HashMap<(DeviceId, u8), HashMap<EventKey, f32>>,
}

impl AxisContributions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` as `source`'s contribution to the channel and returns
    /// the combined, clamped channel output.
    pub fn store(
        &mut self,
        device_id: &DeviceId,
        channel: u8,
        source: &EventKey,
        value: f32,
    ) -> f32 {
        self.table
            .entry((device_id.clone(), channel))
            .or_default()
            .insert(source.clone(), value);
        self.combined(device_id, channel)
    }

    /// The combined output for a channel, `0` when nothing has contributed.
    pub fn combined(&self, device_id: &DeviceId, channel: u8) -> f32 {
        self.table
            .get(&(device_id.clone(), channel))
            .map(|sources| sources.values().sum::<f32>().clamp(-1.0, 1.0))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_dead_zone_zeroes_small_values_and_rescales_the_rest() {
        assert_eq!(apply_dead_zone(0.1, 0.1), 0.0);
        assert_eq!(apply_dead_zone(-0.05, 0.1), 0.0);
        assert!(approx(apply_dead_zone(0.55, 0.1), 0.5));
        assert!(approx(apply_dead_zone(-1.0, 0.1), -1.0));
    }

    #[test]
    fn test_twenty_percent_dead_zone() {
        let action = ControllerAction::new("hub", 0).with_dead_zone(20);

        assert_eq!(shape_axis(0.1, &action), 0.0);
        assert!(approx(shape_axis(1.0, &action), 1.0));
        assert!(approx(shape_axis(0.3, &action), 0.125));
        assert!(approx(shape_axis(-0.3, &action), -0.125));
    }

    #[test]
    fn test_zero_dead_zone_is_identity() {
        assert_eq!(apply_dead_zone(0.01, 0.0), 0.01);
    }

    #[test]
    fn test_full_dead_zone_does_not_divide_by_zero() {
        assert_eq!(apply_dead_zone(1.0, 1.0), 0.0);
    }

    #[test]
    fn test_curves() {
        assert_eq!(apply_curve(-0.5, AxisCharacteristic::Linear), -0.5);
        assert!(approx(apply_curve(-0.5, AxisCharacteristic::Exponential), -0.25));
        assert!(approx(apply_curve(0.25, AxisCharacteristic::Logarithmic), 0.5));
        assert!(approx(apply_curve(-0.25, AxisCharacteristic::Logarithmic), -0.5));
    }

    #[test]
    fn test_adjust_output_scales_then_inverts() {
        let action = ControllerAction::new("hub", 0).with_max_output(50).inverted();
        assert!(approx(adjust_output(1.0, &action), -0.5));
    }

    #[test]
    fn test_adjust_output_at_full_scale_is_identity() {
        let action = ControllerAction::new("hub", 0);
        assert_eq!(adjust_output(0.3, &action), 0.3);
    }

    #[test]
    fn test_shape_axis_applies_dead_zone_curve_and_adjustment_in_order() {
        // Arrange: dead zone 10%, exponential, 50% max
        let action = ControllerAction::new("hub", 0)
            .with_dead_zone(10)
            .with_axis_characteristic(AxisCharacteristic::Exponential)
            .with_max_output(50);

        // Act
        let out = shape_axis(0.55, &action);

        // Assert: (0.55-0.1)/0.9 = 0.5 → 0.25 → 0.125
        assert!(approx(out, 0.125), "got {out}");
    }

    #[test]
    fn test_shape_axis_inside_dead_zone_is_plain_zero_even_when_inverted() {
        let action = ControllerAction::new("hub", 0).with_dead_zone(20).inverted();
        let out = shape_axis(0.1, &action);
        assert!(out == 0.0 && out.is_sign_positive());
    }

    #[test]
    fn test_contributions_sum_and_clamp() {
        // Arrange
        let mut table = AxisContributions::new();
        let hub = DeviceId::new("hub");

        // Act
        table.store(&hub, 0, &EventKey::axis("LT"), 0.7);
        let combined = table.store(&hub, 0, &EventKey::axis("RT"), 0.6);

        // Assert
        assert_eq!(combined, 1.0);
    }

    #[test]
    fn test_contribution_is_overwritten_not_accumulated() {
        let mut table = AxisContributions::new();
        let hub = DeviceId::new("hub");

        table.store(&hub, 1, &EventKey::axis("X"), 0.9);
        let combined = table.store(&hub, 1, &EventKey::axis("X"), 0.2);

        assert!(approx(combined, 0.2));
        assert!(approx(table.combined(&hub, 1), 0.2));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut table = AxisContributions::new();
        let hub = DeviceId::new("hub");

        table.store(&hub, 0, &EventKey::axis("X"), 0.4);

        assert_eq!(table.combined(&hub, 1), 0.0);
        assert_eq!(table.combined(&DeviceId::new("other"), 0), 0.0);
    }
}
