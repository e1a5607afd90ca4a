//! Infrastructure layer for the player.
//!
//! Contains the outward-facing adapters: the TCP listener for remote events,
//! configuration and profile files, the simulated device driver, and the
//! console front end that hosts a session.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `brick_core`, but MUST NOT be imported by the `application` layer.

pub mod console;
pub mod device;
pub mod network;
pub mod storage;
