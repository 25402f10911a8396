//! Shared state
//!
//! Handles shared between the player, the queue and the HTTP layer: the
//! per-guild volume and the process-wide event broadcaster.

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use voxjuke_common::events::PlayerEvent;

// Re-export PlaybackState from voxjuke-common for convenience
pub use voxjuke_common::events::PlaybackState;

/// Event broadcaster for SSE listeners
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Create a broadcaster buffering up to 100 events per slow listener
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self { event_tx }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: PlayerEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Playback volume (0.0-1.0)
///
/// Read by the decoder loader each time it spawns a process, so a change
/// applies to every decoder started afterwards.
#[derive(Debug, Clone)]
pub struct Volume(Arc<Mutex<f32>>);

impl Volume {
    pub fn new(volume: f32) -> Self {
        Self(Arc::new(Mutex::new(volume.clamp(0.0, 1.0))))
    }

    /// Current volume (0.0-1.0)
    pub fn get(&self) -> f32 {
        match self.0.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Set volume, returning the clamped value that was stored
    pub fn set(&self, volume: f32) -> f32 {
        let volume = volume.clamp(0.0, 1.0);
        match self.0.lock() {
            Ok(mut guard) => *guard = volume,
            Err(poisoned) => *poisoned.into_inner() = volume,
        }
        volume
    }

    /// Volume on the 0-100 user-facing scale
    pub fn percent(&self) -> u8 {
        (self.get() * 100.0).round() as u8
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(1.0)
    }
}
