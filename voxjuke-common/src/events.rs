//! Event types for the voxjuke event stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing loaded, or the queue ran dry
    #[default]
    Idle,
    /// A copy loop is moving bytes to the voice sink
    Playing,
    /// Playback was interrupted mid-entry and can be resumed
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Player events broadcast to SSE listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Playback state changed
    PlaybackStateChanged {
        guild_id: u64,
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },

    /// An entry started playing
    TrackStarted {
        guild_id: u64,
        media_id: String,
        title: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// An entry reached the end of its decoder output
    TrackFinished {
        guild_id: u64,
        media_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Queue contents changed
    QueueChanged {
        guild_id: u64,
        length: usize,
        timestamp: DateTime<Utc>,
    },

    /// Loop mode toggled
    LoopChanged {
        guild_id: u64,
        looping: bool,
        timestamp: DateTime<Utc>,
    },

    /// Volume changed (0.0-1.0)
    VolumeChanged {
        guild_id: u64,
        volume: f32,
        timestamp: DateTime<Utc>,
    },

    /// Voice connection bound to a new channel, or dropped (`None`)
    ConnectionChanged {
        guild_id: u64,
        channel_id: Option<u64>,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string for SSE event names
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::TrackStarted { .. } => "TrackStarted",
            PlayerEvent::TrackFinished { .. } => "TrackFinished",
            PlayerEvent::QueueChanged { .. } => "QueueChanged",
            PlayerEvent::LoopChanged { .. } => "LoopChanged",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::ConnectionChanged { .. } => "ConnectionChanged",
        }
    }

    /// Guild the event belongs to
    pub fn guild_id(&self) -> u64 {
        match self {
            PlayerEvent::PlaybackStateChanged { guild_id, .. }
            | PlayerEvent::TrackStarted { guild_id, .. }
            | PlayerEvent::TrackFinished { guild_id, .. }
            | PlayerEvent::QueueChanged { guild_id, .. }
            | PlayerEvent::LoopChanged { guild_id, .. }
            | PlayerEvent::VolumeChanged { guild_id, .. }
            | PlayerEvent::ConnectionChanged { guild_id, .. } => *guild_id,
        }
    }
}
