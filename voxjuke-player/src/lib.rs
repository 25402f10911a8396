//! # Voxjuke Player Library (voxjuke-player)
//!
//! Per-guild streaming audio player for a chat voice bot.
//!
//! **Purpose:** Resolve media queries, spawn decoder processes that turn remote
//! streams into raw PCM, pump that PCM into a voice connection, and expose the
//! playback commands (play, pause, resume, skip, seek, loop, volume, queue
//! editing) over an HTTP/SSE control interface.
//!
//! **Architecture:** One [`session::GuildSession`] per guild owns a
//! [`playback::PlaybackQueue`], a [`playback::Player`] state machine and a
//! [`voice::ConnectionManager`]. External tools (yt-dlp, ffmpeg) and the voice
//! transport sit behind traits so they can be swapped in tests.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod playback;
pub mod session;
pub mod state;
pub mod voice;

pub use error::{Error, Result};
pub use state::{EventBus, Volume};
