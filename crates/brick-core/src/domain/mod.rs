//! Domain entities for Brick Player.
//!
//! This module contains pure data types with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the application is the **domain**.  Domain code
//! describes *what* the system talks about (controller events, profiles,
//! devices) without knowing *how* events arrive or *how* devices are driven.
//! Outer layers (the HTTP listener, the connection orchestrator) depend on
//! these types, but these types never depend on them.

/// Device identifiers, states, and state-change notifications.
pub mod device;

/// Controller events and multi-event batches.
pub mod event;

/// Controller profiles: which input drives which device channel, and how.
pub mod profile;
