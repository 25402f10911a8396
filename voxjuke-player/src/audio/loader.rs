//! Track loading
//!
//! Pairs a [`MediaResolver`] with a [`Transcoder`]: resolves a track's playable
//! URL and starts a decoder for it at the session's current volume.

use crate::audio::decoder::{DecoderHandle, Transcoder};
use crate::media::{MediaResolver, Track};
use crate::state::Volume;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves tracks and starts their decoder processes
#[derive(Clone)]
pub struct StreamLoader {
    resolver: Arc<dyn MediaResolver>,
    transcoder: Arc<dyn Transcoder>,
    volume: Volume,
}

impl StreamLoader {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        transcoder: Arc<dyn Transcoder>,
        volume: Volume,
    ) -> Self {
        Self {
            resolver,
            transcoder,
            volume,
        }
    }

    /// Start a decoder for `track` beginning at `seek`
    ///
    /// Returns `None` (logged) if the URL cannot be resolved or the process
    /// fails to start.
    pub async fn load(&self, track: &Track, seek: Duration) -> Option<DecoderHandle> {
        let url = match self.resolver.playable_url(track).await {
            Ok(url) => url,
            Err(e) => {
                warn!(media_id = %track.media_id, "Could not resolve playable URL: {}", e);
                return None;
            }
        };

        let volume = self.volume.get();
        debug!(media_id = %track.media_id, volume, seek_secs = seek.as_secs(), "Starting decoder");
        self.transcoder.spawn(&url, volume, seek).await
    }

    pub fn resolver(&self) -> &Arc<dyn MediaResolver> {
        &self.resolver
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }
}
