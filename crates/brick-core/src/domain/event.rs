//! Controller events and multi-event batches.
//!
//! Every input source (a local game pad, the remote HTTP listener) produces
//! the same event shape: an [`EventKey`] naming the physical control plus a
//! floating-point value.  Buttons report `1.0` when pressed and `0.0` when
//! released; axes report a position in `[-1.0, 1.0]`.
//!
//! Sources deliver events in [`ControllerEventBatch`]es.  A batch is the unit
//! of delivery between a producer and the mapping engine and is never split.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of physical control that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ControllerEventType {
    /// A digital control; pressed when the value is above `0.5`.
    #[serde(alias = "button")]
    Button,
    /// An analog control reporting a position in `[-1.0, 1.0]`.
    #[serde(alias = "axis")]
    Axis,
}

impl ControllerEventType {
    /// Parses `text` case-insensitively, falling back to [`ControllerEventType::Button`]
    /// when the text names neither type.
    ///
    /// ```
    /// use brick_core::ControllerEventType;
    ///
    /// assert_eq!(ControllerEventType::parse_or_default("AXIS"), ControllerEventType::Axis);
    /// assert_eq!(ControllerEventType::parse_or_default("joystick"), ControllerEventType::Button);
    /// ```
    pub fn parse_or_default(text: &str) -> Self {
        text.parse().unwrap_or(ControllerEventType::Button)
    }
}

impl FromStr for ControllerEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("button") {
            Ok(ControllerEventType::Button)
        } else if s.eq_ignore_ascii_case("axis") {
            Ok(ControllerEventType::Axis)
        } else {
            Err(UnknownEventType(s.to_string()))
        }
    }
}

impl fmt::Display for ControllerEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerEventType::Button => f.write_str("Button"),
            ControllerEventType::Axis => f.write_str("Axis"),
        }
    }
}

/// Returned by [`ControllerEventType::from_str`] for unrecognised text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown controller event type: {0:?}")]
pub struct UnknownEventType(pub String);

/// Identifies one physical control: its type plus its event code (e.g. `"X"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub event_type: ControllerEventType,
    pub code: String,
}

impl EventKey {
    pub fn new(event_type: ControllerEventType, code: impl Into<String>) -> Self {
        Self {
            event_type,
            code: code.into(),
        }
    }

    pub fn button(code: impl Into<String>) -> Self {
        Self::new(ControllerEventType::Button, code)
    }

    pub fn axis(code: impl Into<String>) -> Self {
        Self::new(ControllerEventType::Axis, code)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_type, self.code)
    }
}

/// A single controller event as produced by an input source.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerEvent {
    pub key: EventKey,
    pub value: f32,
    /// Producer-supplied ordering token, monotonic per key.
    ///
    /// `None` means the producer makes no ordering claim; such events are
    /// never compared against earlier ones.
    pub sequence: Option<i64>,
}

impl ControllerEvent {
    pub fn new(key: EventKey, value: f32, sequence: Option<i64>) -> Self {
        Self {
            key,
            value,
            sequence,
        }
    }
}

/// An ordered multi-event notification holding at most one value per key.
///
/// Inserting a key that is already present replaces its value but keeps its
/// original position, so the batch reflects the *last* value written for each
/// control in the order the controls were first touched.
///
/// # Examples
///
/// ```
/// use brick_core::{ControllerEventBatch, EventKey};
///
/// let mut batch = ControllerEventBatch::new();
/// batch.insert(EventKey::axis("X"), 0.2);
/// batch.insert(EventKey::axis("Y"), 0.4);
/// batch.insert(EventKey::axis("X"), 0.9);
///
/// let values: Vec<f32> = batch.iter().map(|(_, v)| v).collect();
/// assert_eq!(values, vec![0.9, 0.4]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerEventBatch {
    entries: Vec<(EventKey, f32)>,
}

impl ControllerEventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a batch holding a single event.
    pub fn single(key: EventKey, value: f32) -> Self {
        let mut batch = Self::new();
        batch.insert(key, value);
        batch
    }

    /// Sets the value for `key`, last write wins.
    pub fn insert(&mut self, key: EventKey, value: f32) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &EventKey) -> Option<f32> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| *value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(key, value)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&EventKey, f32)> {
        self.entries.iter().map(|(key, value)| (key, *value))
    }
}

impl FromIterator<(EventKey, f32)> for ControllerEventBatch {
    fn from_iter<I: IntoIterator<Item = (EventKey, f32)>>(iter: I) -> Self {
        let mut batch = Self::new();
        for (key, value) in iter {
            batch.insert(key, value);
        }
        batch
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
