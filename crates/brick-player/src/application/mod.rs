//! Application layer of the player.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The application layer sits between the domain types in `brick_core` and
//! the infrastructure (sockets, files, radios).  It coordinates domain objects
//! to fulfil a user goal ("play with this profile on these devices") and
//! depends only on traits, so every piece can be tested with fakes.
//!
//! # Sub-modules
//!
//! - **`ports`** – The capabilities the application needs from the outside
//!   world: the [`ports::Device`] trait and the [`ports::SessionObserver`]
//!   callbacks.
//!
//! - **`multiplexer`** – Fans every event source (remote listener, local game
//!   pads) into one queue and hands batches to the active session.
//!
//! - **`orchestrator`** – Connects and disconnects the session's devices
//!   concurrently, with a shared cancellation token per attempt, automatic
//!   reconnect, and deferred output levels.
//!
//! - **`session`** – The play-session control surface: start, end, suspend,
//!   output level, and the single mapping task.

pub mod multiplexer;
pub mod orchestrator;
pub mod ports;
pub mod session;
