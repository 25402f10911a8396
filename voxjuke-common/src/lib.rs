//! # Voxjuke Common Library
//!
//! Shared code for the voxjuke voice-channel player including:
//! - Configuration loading (TOML file, environment overrides)
//! - Event types (`PlayerEvent`, `PlaybackState`)
//! - Human-readable time formatting and parsing
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod time;

pub use error::{Error, Result};
pub use events::{PlaybackState, PlayerEvent};
