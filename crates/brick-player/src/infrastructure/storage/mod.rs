//! Storage infrastructure: the player config file and controller profiles.
//!
//! Both are TOML.  Missing config files fall back to defaults; a missing or
//! invalid profile is an error reported before any session starts.

pub mod config;
