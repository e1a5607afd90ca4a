//! Per-key sequence filter for dropping stale remote events.
//!
//! # Why filter by sequence? (for beginners)
//!
//! A browser that streams joystick positions may open several connections at
//! once, and the requests can overtake each other on the way to the player.
//! Each request therefore carries a *sequence number* (typically a millisecond
//! timestamp).  For every control the filter remembers the highest sequence
//! accepted so far and rejects anything older, so a late packet can never
//! snap the joystick back to a previous position.
//!
//! Events without a sequence (`None`) make no ordering claim: they are always
//! accepted and never recorded.
//!
//! # Ownership
//!
//! The filter is a plain `&mut self` structure.  The listener gives it to a
//! single decoder task, so no locking is required.

use std::collections::HashMap;

use crate::domain::event::EventKey;

/// Remembers the highest accepted sequence number per [`EventKey`].
///
/// # Examples
///
/// ```rust
/// use brick_core::{EventKey, SequenceFilter};
///
/// let mut filter = SequenceFilter::new();
/// let key = EventKey::axis("X");
///
/// assert!(filter.admit(&key, Some(10)));
/// assert!(!filter.admit(&key, Some(9)));   // stale
/// assert!(filter.admit(&key, Some(10)));   // equal is not stale
/// assert!(filter.admit(&key, None));       // unordered, always accepted
/// ```
#[derive(Debug, Default)]
pub struct SequenceFilter {
    last: HashMap<EventKey, i64>,
}

impl SequenceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether an event for `key` carrying `sequence` is fresh.
    ///
    /// Returns `false` (skip) only when `sequence` is present, a previous
    /// sequence for `key` is recorded, and `sequence` is strictly smaller.
    /// Accepted ordered sequences become the new high-water mark for `key`.
    pub fn admit(&mut self, key: &EventKey, sequence: Option<i64>) -> bool {
        let Some(sequence) = sequence else {
            return true;
        };

        match self.last.get_mut(key) {
            Some(last) if sequence < *last => false,
            Some(last) => {
                *last = sequence;
                true
            }
            None => {
                self.last.insert(key.clone(), sequence);
                true
            }
        }
    }

    /// The highest sequence accepted for `key`, if any.
    pub fn last_accepted(&self, key: &EventKey) -> Option<i64> {
        self.last.get(key).copied()
    }

    /// Number of keys with a recorded sequence.
    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }

    /// Forgets every recorded sequence.
    pub fn clear(&mut self) {
        self.last.clear();
    }
}
