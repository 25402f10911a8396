//! Playback state machine and queue management

pub mod entry;
pub mod player;
pub mod queue;
pub mod state;

pub use entry::{EntryInfo, QueueEntry};
pub use player::{Player, SEEK_GUARD};
pub use queue::PlaybackQueue;
pub use state::{CommandStatus, LoopOutcome, NowPlaying, PlaybackState};
