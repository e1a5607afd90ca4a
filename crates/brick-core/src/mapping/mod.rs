//! The controller event mapping engine.
//!
//! Mapping turns controller events into device output values.  It is split
//! into three small pieces:
//!
//! - [`button`] – the per-code button state machine (toggle, alternate, …).
//! - [`axis`] – dead zones, response curves, output adjustment, and the
//!   table that sums several axes driving one channel.
//! - [`engine`] – [`MappingEngine`], which walks a profile for each incoming
//!   batch and writes results through an [`OutputSink`].

pub mod axis;
pub mod button;
pub mod engine;

pub use engine::{MappingEngine, OutputSink};
