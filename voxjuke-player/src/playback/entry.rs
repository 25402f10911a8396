//! Queue entries

use crate::audio::DecoderHandle;
use crate::media::Track;
use uuid::Uuid;

/// One queued playable item
///
/// Owns its decoder process once preloaded. Ownership moves from the queue to
/// the player on dequeue; whoever holds the entry is responsible for disposing
/// the decoder (dropping it also kills the process).
#[derive(Debug)]
pub struct QueueEntry {
    pub entry_id: Uuid,
    pub track: Track,
    /// Display name of the requesting user
    pub requested_by: Option<String>,
    decoder: Option<DecoderHandle>,
}

/// Read-only view of an entry for listings and now-playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub entry_id: Uuid,
    pub track: Track,
    pub requested_by: Option<String>,
    pub preloaded: bool,
}

impl QueueEntry {
    pub fn new(track: Track, requested_by: Option<String>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            track,
            requested_by,
            decoder: None,
        }
    }

    /// New entry for the same media, without a decoder
    pub fn fresh_copy(&self) -> Self {
        Self::new(self.track.clone(), self.requested_by.clone())
    }

    pub fn is_preloaded(&self) -> bool {
        self.decoder.is_some()
    }

    /// Attach a decoder, disposing any previous one
    pub fn attach_decoder(&mut self, decoder: DecoderHandle) {
        if let Some(old) = self.decoder.replace(decoder) {
            old.dispose();
        }
    }

    pub fn decoder_mut(&mut self) -> Option<&mut DecoderHandle> {
        self.decoder.as_mut()
    }

    /// Terminate the decoder in the background, if any
    pub fn dispose_decoder(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            decoder.dispose();
        }
    }

    /// Consume the entry, disposing its decoder
    pub fn dispose(mut self) {
        self.dispose_decoder();
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            entry_id: self.entry_id,
            track: self.track.clone(),
            requested_by: self.requested_by.clone(),
            preloaded: self.is_preloaded(),
        }
    }
}
