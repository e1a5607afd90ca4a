//! Decoding of remote event request paths.
//!
//! A request path carries zero or more events as consecutive groups of four
//! segments:
//!
//! ```text
//! /<Type>/<Key>/<Value>/<Sequence>[/<Type>/<Key>/<Value>/<Sequence>…]
//! ```
//!
//! Decoding never fails.  Malformed fields fall back to defaults (`Button`,
//! value `0`, no sequence) so a misbehaving client cannot stall the player.
//! A path with fewer than four segments is a request for the built-in control
//! page.

use std::fmt::Write as _;

use tracing::trace;

use crate::domain::event::{ControllerEvent, ControllerEventBatch, ControllerEventType, EventKey};
use crate::protocol::sequence::SequenceFilter;

/// Number of path segments that make up one event.
pub const SEGMENTS_PER_EVENT: usize = 4;

/// One event as it appeared on the wire, with its filter verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event: ControllerEvent,
    /// `true` when the event was older than the last accepted one for its key.
    pub skipped: bool,
}

/// The result of decoding one request path.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRequest {
    /// The path was too short to carry an event; serve the control page.
    ControlPage,
    /// The path carried events.
    Events {
        /// Every decoded event in wire order, skipped ones included.
        decoded: Vec<DecodedEvent>,
        /// Non-skipped events, one value per key, last write wins.
        batch: ControllerEventBatch,
    },
}

impl DecodedRequest {
    /// Renders the plain-text echo returned to the client: one
    /// `Type:Key:Value:skipped` line per decoded event.
    ///
    /// The control page has no echo and renders as an empty string.
    pub fn echo(&self) -> String {
        let mut out = String::new();
        if let DecodedRequest::Events { decoded, .. } = self {
            for (i, d) in decoded.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                // Writing to a String cannot fail.
                let _ = write!(
                    out,
                    "{}:{}:{}:{}",
                    d.event.key.event_type, d.event.key.code, d.event.value, d.skipped
                );
            }
        }
        out
    }
}

/// Decodes `path` into events, consulting and updating `filter`.
///
/// Leading and trailing `/` are ignored.  An incomplete trailing group of
/// fewer than four segments is ignored.
///
/// # Examples
///
/// ```rust
/// use brick_core::{decode_request_path, DecodedRequest, EventKey, SequenceFilter};
///
/// let mut filter = SequenceFilter::new();
/// let decoded = decode_request_path("/Axis/X/-0.5/10", &mut filter);
///
/// match decoded {
///     DecodedRequest::Events { batch, .. } => {
///         assert_eq!(batch.get(&EventKey::axis("X")), Some(-0.5));
///     }
///     DecodedRequest::ControlPage => unreachable!(),
/// }
/// ```
pub fn decode_request_path(path: &str, filter: &mut SequenceFilter) -> DecodedRequest {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.len() < SEGMENTS_PER_EVENT {
        return DecodedRequest::ControlPage;
    }

    let mut decoded = Vec::with_capacity(segments.len() / SEGMENTS_PER_EVENT);
    let mut batch = ControllerEventBatch::new();

    for group in segments.chunks_exact(SEGMENTS_PER_EVENT) {
        let event = decode_event(group[0], group[1], group[2], group[3]);
        let skipped = !filter.admit(&event.key, event.sequence);
        if skipped {
            trace!(key = %event.key, sequence = ?event.sequence, "dropping stale remote event");
        } else {
            batch.insert(event.key.clone(), event.value);
        }
        decoded.push(DecodedEvent { event, skipped });
    }

    DecodedRequest::Events { decoded, batch }
}

fn decode_event(event_type: &str, code: &str, value: &str, sequence: &str) -> ControllerEvent {
    ControllerEvent::new(
        EventKey::new(ControllerEventType::parse_or_default(event_type), code),
        parse_value(value),
        parse_sequence(sequence),
    )
}

/// Parses a plain decimal value: surrounding whitespace, one leading or
/// trailing sign, `,` group separators in the integral part and `.` as the
/// decimal point.  Exponents are rejected.  Anything unparsable or non-finite
/// becomes `0`.
fn parse_value(text: &str) -> f32 {
    let text = text.trim();
    let (negative, unsigned) = if let Some(rest) = text.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = text.strip_prefix('+') {
        (false, rest)
    } else if let Some(rest) = text.strip_suffix('-') {
        (true, rest)
    } else {
        (false, text.strip_suffix('+').unwrap_or(text))
    };

    let (integral, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let integral: String = integral.chars().filter(|&c| c != ',').collect();
    let has_digits = !integral.is_empty() || !fraction.is_empty();
    let only_digits = integral
        .chars()
        .chain(fraction.chars())
        .all(|c| c.is_ascii_digit());
    if !has_digits || !only_digits {
        return 0.0;
    }

    match format!("{integral}.{fraction}").parse::<f32>() {
        Ok(v) if v.is_finite() => {
            if negative {
                -v
            } else {
                v
            }
        }
        _ => 0.0,
    }
}

/// `i64::MIN` on the wire is the explicit "unordered" marker.
fn parse_sequence(text: &str) -> Option<i64> {
    match text.trim().parse::<i64>() {
        Ok(i64::MIN) | Err(_) => None,
        Ok(v) => Some(v),
    }
}
