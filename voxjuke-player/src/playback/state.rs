//! Command outcomes and player snapshots

use crate::playback::entry::EntryInfo;
use serde::Serialize;
use std::fmt;

pub use voxjuke_common::events::PlaybackState;

/// Result of a player command
///
/// These are expected outcomes, not failures: the command layer turns each
/// into a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    /// Already in the requested state
    Already,
    /// Nothing to play / nothing playing
    EmptyQueue,
    /// No usable voice connection, or the entry could not be started
    Disconnected,
    InvalidArgument,
    OutOfRange,
    NotCurrentlyPlaying,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Ok => "ok",
            CommandStatus::Already => "already",
            CommandStatus::EmptyQueue => "empty_queue",
            CommandStatus::Disconnected => "disconnected",
            CommandStatus::InvalidArgument => "invalid_argument",
            CommandStatus::OutOfRange => "out_of_range",
            CommandStatus::NotCurrentlyPlaying => "not_currently_playing",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of toggling loop mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    NowLooping,
    NoLongerLooping,
    /// No current entry to loop
    NothingToLoop,
}

/// Snapshot of what the player is doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub entry: Option<EntryInfo>,
    pub state: PlaybackState,
    /// Elapsed seconds, -1 when no decoder is attached
    pub elapsed_secs: i64,
    pub looping: bool,
}
